mod config;
mod error;
mod handlers;
mod models;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use chrono::{FixedOffset, NaiveDateTime};
use spa_core::db::{self, SqliteStore};
use spa_core::notify::{LogNotifier, Notifier, TelegramNotifier};
use spa_core::BookingService;
use sqlx::sqlite::SqlitePoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use config::Config;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub booking: BookingService,
    pub started_at: Instant,
    pub utc_offset: FixedOffset,
}

impl AppState {
    /// Current wall-clock time at the spa.
    pub fn now(&self) -> NaiveDateTime {
        config::local_now(self.utc_offset)
    }
}

fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public and client endpoints
    let client_routes = Router::new()
        .route("/api/health", get(handlers::health::health))
        .route("/api/availability", get(handlers::client::availability))
        .route("/api/bookings", post(handlers::client::create_booking))
        .route(
            "/api/bookings/{id}/cancel",
            post(handlers::client::cancel_booking),
        )
        .route(
            "/api/vouchers/verify",
            post(handlers::client::verify_voucher),
        );

    // Staff endpoints (X-Staff-Id required)
    let staff_routes = Router::new()
        .route(
            "/api/staff/appointments/{id}/status",
            put(handlers::staff::update_status),
        )
        .route(
            "/api/staff/appointments/{id}",
            delete(handlers::staff::delete_appointment),
        )
        .route("/api/staff/blocks", post(handlers::staff::create_block))
        .route(
            "/api/staff/blocks/{id}",
            delete(handlers::staff::delete_block),
        )
        .route(
            "/api/staff/vouchers",
            post(handlers::vouchers::issue_voucher),
        )
        .route(
            "/api/staff/vouchers/{code}/redeem",
            post(handlers::vouchers::redeem_voucher),
        )
        .route(
            "/api/staff/vouchers/{code}/cancel",
            post(handlers::vouchers::cancel_voucher),
        )
        .route(
            "/api/staff/vouchers/{code}/redemptions",
            get(handlers::vouchers::redemption_history),
        );

    Router::new()
        .merge(client_routes)
        .merge(staff_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // ── Tracing ──
    let env_filter = EnvFilter::from_default_env().add_directive("info".parse()?);
    let fmt_layer = tracing_subscriber::fmt::layer();
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    // ── Config ──
    let config = Config::from_env()?;
    let grid = config.grid()?;

    let notifier: Arc<dyn Notifier> = match config.telegram.clone() {
        Some((bot_token, chat_id)) => Arc::new(TelegramNotifier::new(bot_token, chat_id)),
        None => {
            tracing::warn!("BOT_TOKEN or ADMIN_TG_ID not set, notifications are only logged");
            Arc::new(LogNotifier)
        }
    };

    // ── Database ──
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    db::run_migrations(&pool).await?;

    let store = Arc::new(SqliteStore::new(pool.clone()));
    let state = Arc::new(AppState {
        db: pool,
        booking: BookingService::new(store, notifier, grid),
        started_at: Instant::now(),
        utc_offset: config.utc_offset,
    });

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!(
        "Spa server starting on {} (hours {}-{}, step {} min)",
        addr,
        config.hours.open,
        config.hours.close,
        config.hours.step_minutes
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
