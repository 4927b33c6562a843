use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use k6_runner::api;
use k6_runner::config::Config;
use k6_runner::container::ContainerManager;
use k6_runner::executor::LoadTestRunner;
use k6_runner::state::AppState;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("🚀 Starting k6 runner service");

    let config = Config::from_env().context("Failed to load configuration")?;
    info!("📋 Configuration loaded, workspaces under {}", config.base_dir.display());

    let container_manager = ContainerManager::new(&config)
        .await
        .context("Failed to initialize container manager")?;
    info!("🐳 Container manager initialized");

    let runner = LoadTestRunner::from_config(Arc::new(container_manager), &config);
    let app_state = web::Data::new(AppState::new(runner));

    let enable_controller = config.enable_controller;
    let bind_addr = format!("{}:{}", config.host, config.port);
    info!("🌐 Starting HTTP server on {}", bind_addr);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .configure(|cfg| api::configure_routes(cfg, enable_controller))
    })
    .bind(&bind_addr)?
    .run()
    .await?;

    Ok(())
}
