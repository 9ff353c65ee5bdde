use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::{self, TraceLayer};
use tracing::{Level, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::store::{AppointmentStore, InMemoryAppointmentStore, SupabaseAppointmentStore};
use doctor_cell::store::{DoctorStore, InMemoryDoctorStore, SupabaseDoctorStore};
use shared_config::{AppConfig, StoreBackend};
use shared_utils::clock::SystemClock;

fn build_stores(config: &AppConfig) -> (Arc<dyn DoctorStore>, Arc<dyn AppointmentStore>) {
    match config.store_backend {
        StoreBackend::Supabase => {
            info!("Using Supabase store at {}", config.supabase_url);
            (
                Arc::new(SupabaseDoctorStore::new(config)),
                Arc::new(SupabaseAppointmentStore::new(config)),
            )
        }
        StoreBackend::Memory => {
            warn!("Using in-memory store; data is lost on restart");
            (
                Arc::new(InMemoryDoctorStore::new()),
                Arc::new(InMemoryAppointmentStore::new()),
            )
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting clinic scheduling API server");

    let config = Arc::new(AppConfig::from_env());
    let (doctors, appointments) = build_stores(&config);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router::create_router(config.clone(), doctors, appointments, Arc::new(SystemClock))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new()
                    .level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new()
                    .level(Level::INFO)),
        )
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .await
        .context("server terminated unexpectedly")?;

    Ok(())
}
