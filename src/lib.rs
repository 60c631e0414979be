//! # Campaign Documentation
//!
//! Micro-sites for political candidates: one slugged subsite per candidate
//! with topic pages, polls, quizzes and a feedback form, plus dashboards for
//! the candidate and the platform admin.
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
//!
//!
//!
//! # Workspace
//! - `backend/catalog`: typed, validated candidate content
//! - `backend/server`: axum API, SQLite ledger, aggregation
//! - `backend/process`: operator CLI (`validate`, `reset`)
//!
//!
//!
//! # General Infrastructure
//! - Reverse proxy serves the static frontend and forwards `/api/` to the server
//! - Proxy must overwrite `X-Forwarded-For`/`X-Real-IP`, the server trusts them
//! - Secrets (`ANALYTICS_SALT`, `PLATFORM_ADMIN_PASS`) mounted under `/run/secrets`
//! - `/data` volume holds the SQLite file and `geoip/GeoLite2-City.mmdb`
//!
//!
//!
//! # Environment
//!
//! | Key | Default |
//! |---|---|
//! | `RUST_PORT` | 8000 |
//! | `DB_PATH` | `/data/campaign.db` |
//! | `CATALOG_PATH` | `/app/config/catalog.json` |
//! | `GEOIP_PATH` | `/data/geoip/GeoLite2-City.mmdb` |
//! | `FEEDBACK_DAILY_LIMIT` | 3 |
//! | `FEEDBACK_MAX_CHARS` | 1000 |
//! | `UNIQUE_QUIZ_ANSWERS` | false |
//! | `STORAGE_TIMEOUT_MS` | 2000 |
//! | `PLATFORM_ADMIN_USER` | admin |
//! | `RUST_LOG` | unset, e.g. `server=info` |
//!
//!
//!
//! # Operations
//!
//! Check a catalog before deploying it.
//! ```sh
//! cargo run -p process -- validate config/catalog.json
//! ```
//!
//! Wipe one candidate's analytics (server may keep running, WAL).
//! ```sh
//! cargo run -p process -- reset --db /data/campaign.db --slug kandidat-a --yes
//! ```
//!
//! Swap in a new GeoLite2 file.
//! ```sh
//! curl -u admin:$PASS -X POST localhost:8000/api/platform/geoip/reload
//! ```

pub mod frontend;
