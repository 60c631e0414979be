//! # Geolocation
//!
//! Coarse city/region/country lookup against a local MaxMind GeoLite2-City
//! database. No network calls, no retained addresses.
//!
//! Location is enrichment only: every failure (no database, private address,
//! garbage input, address not in the database) resolves to
//! `unknown/unknown/unknown` instead of an error.
//!
//! The platform admin can drop a new `.mmdb` file in place and trigger
//! [`Geolocator::reload`]. Lookups clone the current `Arc` under a short read
//! lock and finish on that snapshot, so a swap never tears a lookup.
use std::{
    collections::HashMap,
    net::IpAddr,
    path::PathBuf,
    sync::{Arc, PoisonError, RwLock},
};

use maxminddb::{MaxMindDBError, Reader, geoip2};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

pub const UNKNOWN: &str = "unknown";
const LOCALE: &str = "en";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub city: String,
    pub region: String,
    pub country: String,
}

impl Location {
    pub fn new(city: &str, region: &str, country: &str) -> Self {
        Self {
            city: city.to_string(),
            region: region.to_string(),
            country: country.to_string(),
        }
    }

    pub fn unknown() -> Self {
        Self::new(UNKNOWN, UNKNOWN, UNKNOWN)
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::unknown()
    }
}

pub trait GeoSource: Send + Sync {
    fn lookup(&self, address: IpAddr) -> Option<Location>;
}

pub struct MaxMindSource {
    reader: Reader<Vec<u8>>,
}

impl MaxMindSource {
    pub fn open(path: &std::path::Path) -> Result<Self, MaxMindDBError> {
        Ok(Self {
            reader: Reader::open_readfile(path)?,
        })
    }
}

impl GeoSource for MaxMindSource {
    fn lookup(&self, address: IpAddr) -> Option<Location> {
        let record: geoip2::City = self.reader.lookup(address).ok()?;

        let city = record.city.and_then(|c| name(c.names));
        let region = record
            .subdivisions
            .and_then(|subdivisions| subdivisions.into_iter().last())
            .and_then(|s| name(s.names));
        let country = record.country.and_then(|c| name(c.names));

        Some(Location::new(
            city.unwrap_or(UNKNOWN),
            region.unwrap_or(UNKNOWN),
            country.unwrap_or(UNKNOWN),
        ))
    }
}

fn name<'a>(names: Option<std::collections::BTreeMap<&'a str, &'a str>>) -> Option<&'a str> {
    names?.get(LOCALE).copied().filter(|n| !n.is_empty())
}

/// Fixed address table, for installations without a GeoLite2 licence and
/// for tests.
#[derive(Debug, Default)]
pub struct TableSource {
    entries: HashMap<IpAddr, Location>,
}

impl TableSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, address: IpAddr, location: Location) -> Self {
        self.entries.insert(address, location);
        self
    }
}

impl GeoSource for TableSource {
    fn lookup(&self, address: IpAddr) -> Option<Location> {
        self.entries.get(&address).cloned()
    }
}

#[derive(Error, Debug)]
#[error("Failed to open geolocation database {path}: {source}")]
pub struct GeoError {
    path: String,
    source: MaxMindDBError,
}

type Snapshot = Option<Arc<dyn GeoSource>>;

pub struct Geolocator {
    source: RwLock<Snapshot>,
    path: Option<PathBuf>,
}

impl Geolocator {
    pub fn disabled() -> Self {
        Self {
            source: RwLock::new(None),
            path: None,
        }
    }

    pub fn with_source(source: impl GeoSource + 'static) -> Self {
        Self {
            source: RwLock::new(Some(Arc::new(source))),
            path: None,
        }
    }

    /// Missing or unreadable files start the geolocator in degraded mode.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let geolocator = Self {
            source: RwLock::new(None),
            path: Some(path.into()),
        };

        if let Err(e) = geolocator.reload() {
            warn!("{e}, locations will be unknown");
        }

        geolocator
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot().is_some()
    }

    pub fn resolve(&self, raw_address: &str) -> Location {
        let Ok(address) = raw_address.trim().parse::<IpAddr>() else {
            return Location::unknown();
        };

        if !is_public(address) {
            return Location::unknown();
        }

        self.snapshot()
            .and_then(|source| source.lookup(address))
            .unwrap_or_default()
    }

    pub fn replace(&self, source: Option<Arc<dyn GeoSource>>) {
        *self.source.write().unwrap_or_else(PoisonError::into_inner) = source;
    }

    /// Re-reads the database file.
    ///
    /// `Ok(false)` when the file does not exist (degraded mode). On a file
    /// that exists but cannot be opened the current snapshot is kept.
    pub fn reload(&self) -> Result<bool, GeoError> {
        let Some(path) = &self.path else {
            return Ok(self.is_loaded());
        };

        if !path.exists() {
            info!("No geolocation database at {}", path.display());
            self.replace(None);
            return Ok(false);
        }

        let source = MaxMindSource::open(path).map_err(|source| GeoError {
            path: path.display().to_string(),
            source,
        })?;

        self.replace(Some(Arc::new(source)));
        info!("Loaded geolocation database {}", path.display());

        Ok(true)
    }

    fn snapshot(&self) -> Snapshot {
        self.source
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn is_public(address: IpAddr) -> bool {
    match address {
        IpAddr::V4(v4) => {
            !(v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast())
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_public(IpAddr::V4(v4));
            }

            let first = v6.segments()[0];
            let unique_local = first & 0xfe00 == 0xfc00;
            let link_local = first & 0xffc0 == 0xfe80;

            !(v6.is_loopback() || v6.is_unspecified() || unique_local || link_local)
        }
    }
}
