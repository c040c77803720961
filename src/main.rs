use std::net::SocketAddr;
use std::path::Path;

use config::FinalConfig;
use controller::create_router;
use cyder_tools::log::{info, LocalLogger};
use database::DbPool;
use service::app_state::{create_app_state, create_state_router};
use service::seed::SeedData;

mod config;
mod controller;
mod database;
mod service;
mod utils;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = FinalConfig::load()?;
    LocalLogger::init(&config.log_level);
    info!("{} starting in {} mode", config.app_name, config.environment);

    let db = DbPool::establish(&config.db_url, &config.db_schema)?;
    if let Some(seed_file) = config.seed_file.as_deref() {
        SeedData::from_file(Path::new(seed_file))?.apply(&db)?;
        info!("seed data applied from {}", seed_file);
    }

    let addr = format!("{}:{}", &config.host, config.port);
    let app_state = create_app_state(config, db)?;
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("server start at {}", &addr);
    axum::serve(
        listener,
        create_state_router()
            .merge(create_router())
            .with_state(app_state)
            .into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
