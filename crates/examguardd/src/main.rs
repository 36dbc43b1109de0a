use anyhow::Result;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod store;

const BUS_NAME: &str = "org.examguard.Proctor1";
const OBJECT_PATH: &str = "/org/examguard/Proctor1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "examguardd starting");

    let config = config::Config::from_env()?;
    tracing::info!(
        model_dir = %config.model_dir.display(),
        db = %config.db_path.display(),
        pipeline = ?config.engine.pipeline,
        "configuration loaded"
    );

    let store = store::SqliteTemplateStore::open(&config.db_path)?;
    let identity = engine::build_identity_engine(&config);
    let summary = engine::EngineSummary::of(&identity);
    tracing::info!(
        backend = summary.backend,
        matcher = summary.matcher,
        tolerance = summary.tolerance,
        phone_detection = summary.phone_detection,
        "engine built"
    );

    let handle = engine::spawn_engine(identity, store)?;
    let service = dbus_interface::ProctorService::new(
        handle,
        summary,
        Duration::from_secs(config.verify_timeout_secs),
        Duration::from_secs(config.enroll_timeout_secs),
    );

    let builder = if config.system_bus {
        zbus::connection::Builder::system()?
    } else {
        zbus::connection::Builder::session()?
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await?;

    tracing::info!(bus = BUS_NAME, path = OBJECT_PATH, system = config.system_bus, "examguardd ready");

    // Keep running until signaled
    tokio::signal::ctrl_c().await?;
    tracing::info!("examguardd shutting down");

    Ok(())
}
