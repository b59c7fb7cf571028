//! Warehouse Gate Library
//!
//! A warehouse CRUD service (customers, items, orders) where every operation is
//! gated by a bearer token issued by an external OpenID-style identity provider.
//!
//! # Features
//!
//! - **JWKS verification**: RS256 signatures checked against the provider's
//!   published key set, refreshed on unknown `kid` and on age
//! - **Permissions**: each route demands one exact permission string from the
//!   token's permission claim
//! - **Failure taxonomy**: every rejection carries a typed kind and an HTTP status
//! - **Production Ready**: structured logging, metrics, graceful shutdown

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod server;
pub mod warehouse;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    }
    .map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {e}")))
}
