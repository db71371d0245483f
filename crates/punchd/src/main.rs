use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

use punch_core::{Gallery, Session};

mod config;
mod dbus_interface;
mod store;

use config::Config;
use dbus_interface::{AppState, PunchService};
use store::AttendanceStore;

const BUS_NAME: &str = "org.punchd.Attendance1";
const OBJECT_PATH: &str = "/org/punchd/Attendance1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("punchd starting");

    let config = Config::from_env();

    let store = AttendanceStore::open(&config.db_path)
        .await
        .with_context(|| format!("opening database at {}", config.db_path.display()))?;
    tracing::info!(path = %config.db_path.display(), "attendance store opened");

    let gallery = Gallery::load(&config.encodings_path)
        .with_context(|| format!("loading encodings from {}", config.encodings_path.display()))?;
    tracing::info!(identities = gallery.len(), "embedding gallery loaded");

    let session = Session::new(config.session_config());
    let session_bus = config.session_bus;

    let state = Arc::new(Mutex::new(AppState {
        config,
        store,
        gallery,
        session,
    }));
    let service = PunchService { state };

    let builder = if session_bus {
        zbus::connection::Builder::session()?
    } else {
        zbus::connection::Builder::system()?
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .context("registering D-Bus service")?;

    tracing::info!(bus = BUS_NAME, path = OBJECT_PATH, "punchd ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("punchd shutting down");

    Ok(())
}
