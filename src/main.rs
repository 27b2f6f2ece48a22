use actix_cors::Cors;
use actix_web::{middleware::Logger, App, HttpServer};
use dotenv::dotenv;
use std::env;
use std::time::Duration;

use microlearn_app::{
    config::Config,
    handlers,
    models::learning_path::LearningPath,
    services::{auth::log_auth_events, database::DatabaseService, Services},
    tasks::session_sweep::start_session_sweep,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env().expect("Failed to load configuration");

    let database_service = DatabaseService::new(&config.database_url)
        .await
        .expect("Failed to initialize database");

    if let Err(e) = database_service
        .seed_learning_paths(&LearningPath::starter_catalog())
        .await
    {
        log::error!("Failed to seed learning paths: {}", e);
    }

    let services = Services::new(&config, database_service);
    tokio::spawn(log_auth_events(services.auth.subscribe()));
    tokio::spawn(start_session_sweep(
        services.auth.clone(),
        services.reconciliation.clone(),
        Duration::from_secs(config.app.session_sweep_secs.max(1)),
    ));

    if services.gateway.is_live() {
        log::info!("Payment gateway: live ({})", config.gateway.api_url);
    } else {
        log::warn!("Payment gateway: mock mode, checkouts redirect straight back");
    }

    let port = env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let bind_address = format!("0.0.0.0:{}", port);

    log::info!("Starting micro-learning server on {}", bind_address);

    HttpServer::new(move || {
        let services = services.clone();
        App::new()
            .wrap(Logger::default())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .supports_credentials(),
            )
            .configure(move |cfg| {
                services.register(cfg);
                handlers::configure(cfg);
            })
    })
    .bind(&bind_address)?
    .run()
    .await
}
