//! HTTP Basic credentials for the candidate and platform admin routes.
use axum::http::{HeaderMap, header::AUTHORIZATION};
use base64::{Engine, engine::general_purpose::STANDARD};
use subtle::ConstantTimeEq;

use crate::error::AppError;

#[derive(Debug, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

pub fn parse_basic(headers: &HeaderMap) -> Option<Credentials> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
    let (user, password) = decoded.split_once(':')?;

    Some(Credentials {
        user: user.to_string(),
        password: password.to_string(),
    })
}

fn matches(given: &str, expected: &str) -> bool {
    given.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Both fields are always compared so timing does not reveal which one was
/// wrong. An empty expected password never matches.
pub fn require(
    headers: &HeaderMap,
    user: &str,
    password: &str,
    realm: &'static str,
) -> Result<(), AppError> {
    let given = parse_basic(headers).ok_or(AppError::Unauthorized { realm })?;

    let user_ok = matches(&given.user, user);
    let password_ok = matches(&given.password, password);

    if user_ok & password_ok & !password.is_empty() {
        Ok(())
    } else {
        Err(AppError::Unauthorized { realm })
    }
}
