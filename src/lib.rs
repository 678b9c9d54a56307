//! Drawn to Run: discover, organize and register for running events.
//!
//! The library holds the domain logic (comment threads, events,
//! registrations), the persistence layer behind the [`store::Store`] trait
//! and the actix-web handlers. The binaries in `src/bin` wire these into the
//! HTTP daemon and the operator tools.

use postgres::{Client, NoTls};

pub mod auth;
pub mod comments;
pub mod config;
pub mod error;
pub mod events;
pub mod gpx;
pub mod handlers;
pub mod models;
pub mod registrations;
pub mod store;
pub mod tags;
pub mod users;
pub mod validation;

pub use config::Config;
pub use error::ApiError;

/// Opens a single connection, for the operator tools.
pub fn establish_connection(database_url: &str) -> Result<Client, postgres::Error> {
    Client::connect(database_url, NoTls)
}

pub fn create_db(db: &mut Client) -> Result<(), postgres::Error> {
    db.batch_execute(store::pg::SCHEMA)
}

pub fn empty_db(db: &mut Client) -> Result<(), postgres::Error> {
    db.batch_execute(store::pg::DROP_SCHEMA)
}

/// Installs the global tracing subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "drawntorun=info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
