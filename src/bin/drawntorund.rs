use std::process;
use std::sync::Arc;

use actix_web::{middleware, web, App, HttpServer};

use drawntorun::auth::Authenticator;
use drawntorun::handlers::{self, AppState};
use drawntorun::store::{create_db_pool, PgStore};
use drawntorun::{init_tracing, Config};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    init_tracing();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "invalid configuration");
            process::exit(2);
        }
    };
    let pool = match create_db_pool(&config.database_url, config.pool_size) {
        Ok(pool) => pool,
        Err(err) => {
            tracing::error!(error = %err, "could not open the database pool");
            process::exit(1);
        }
    };

    let state = AppState::new(
        Arc::new(PgStore::new(pool)),
        Authenticator::new(&config.auth),
    );

    tracing::info!(bind_addr = %config.bind_addr, "listening");
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .configure(handlers::configure)
            .default_service(web::to(handlers::not_found))
    })
    .bind(config.bind_addr.as_str())?
    .run()
    .await
}
