#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc};

use base64::{Engine, engine::general_purpose::STANDARD};
use catalog::Catalog;
use chrono::{DateTime, TimeZone, Utc};
use server::{
    config::Policy,
    engagement::{Engagement, Origin},
    geo::{Geolocator, Location, TableSource},
    identity::{IdentityHasher, Salt},
    ledger::Ledger,
    state::State,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

pub const PLATFORM_USER: &str = "admin";
pub const PLATFORM_PASS: &str = "platform-pw";

pub const CATALOG: &str = r#"{
    "candidates": [
        {
            "slug": "kandidat-a",
            "name": "Kandidat A",
            "admin": { "user": "a", "password": "pw-a" },
            "pages": [
                {
                    "slug": "kinder",
                    "theme": "Kinder",
                    "poll": {
                        "id": "p1",
                        "question": "Was zuerst?",
                        "options": ["A", "B", "C", "D"]
                    },
                    "quiz": {
                        "id": "q1",
                        "question": "Wie viele Kitas fehlen?",
                        "options": ["100", "200", "300"],
                        "correct": "200",
                        "explainCorrect": "Laut Bedarfsplan 2026."
                    }
                },
                { "slug": "umwelt", "theme": "Umwelt" }
            ]
        },
        {
            "slug": "kandidat-b",
            "name": "Kandidat B",
            "admin": { "user": "b", "password": "pw-b" },
            "pages": [
                {
                    "slug": "kinder",
                    "poll": { "id": "p1", "question": "?", "options": ["A", "B"] }
                }
            ]
        }
    ]
}"#;

pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, day, hour, 0, 0).unwrap()
}

pub fn origin(address: &str, at: DateTime<Utc>) -> Origin {
    Origin {
        address: address.to_string(),
        user_agent: "Mozilla/5.0 (X11; Linux x86_64)".to_string(),
        at,
    }
}

pub fn geolocator() -> Geolocator {
    let nrw = "Nordrhein-Westfalen";

    Geolocator::with_source(
        TableSource::new()
            .with("203.0.113.7".parse().unwrap(), Location::new("Köln", nrw, "Germany"))
            .with("203.0.113.8".parse().unwrap(), Location::new("Bonn", nrw, "Germany")),
    )
}

pub fn engagement_with(policy: Policy, geo: Geolocator) -> Engagement {
    Engagement::new(
        Ledger::in_memory().unwrap(),
        Catalog::from_json(CATALOG).unwrap(),
        Arc::new(geo),
        IdentityHasher::new(Salt::new("integration-salt").unwrap()),
        policy,
    )
}

pub fn engagement() -> Engagement {
    engagement_with(Policy::default(), geolocator())
}

pub async fn spawn_server() -> SocketAddr {
    spawn_state(State::from_parts(engagement(), PLATFORM_USER, PLATFORM_PASS)).await
}

pub async fn spawn_state(state: Arc<State>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
    let addr = listener.local_addr().expect("listener address");

    tokio::spawn(async move {
        server::serve(listener, state, std::future::pending())
            .await
            .expect("serve app")
    });

    addr
}

pub fn basic(user: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))
}

pub struct Reply {
    pub status: u16,
    pub head: String,
    pub body: serde_json::Value,
}

impl Reply {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.eq_ignore_ascii_case(name).then(|| value.trim())
        })
    }
}

pub async fn send(
    addr: SocketAddr,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    body: Option<&str>,
) -> Reply {
    let mut stream = TcpStream::connect(addr).await.expect("connect server");

    let mut req = format!("{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n");
    if let Some(payload) = body {
        req.push_str("Content-Type: application/json\r\n");
        req.push_str(&format!("Content-Length: {}\r\n", payload.len()));
    } else if method == "POST" {
        req.push_str("Content-Length: 0\r\n");
    }
    for (key, value) in headers {
        req.push_str(&format!("{key}: {value}\r\n"));
    }
    req.push_str("\r\n");
    if let Some(payload) = body {
        req.push_str(payload);
    }

    stream.write_all(req.as_bytes()).await.expect("write request");

    let mut response = String::new();
    stream.read_to_string(&mut response).await.expect("read response");

    let (head, body) = response
        .split_once("\r\n\r\n")
        .expect("http response must have separator");
    let status = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse::<u16>().ok())
        .expect("http status");

    Reply {
        status,
        head: head.to_string(),
        body: serde_json::from_str(body).unwrap_or(serde_json::Value::Null),
    }
}
