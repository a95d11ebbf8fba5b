use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{AppState, router};
use clinrec_core::CoreConfig;
use clinrec_core::config::{data_dir_from_env_value, max_query_rows_from_env_value};

/// Main entry point for the clinical record service
///
/// Resolves configuration once, opens the record store and serves the REST API.
///
/// # Environment Variables
/// - `CLINREC_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `CLINREC_DATA_DIR`: Directory for the record store; unset or blank keeps records in memory
/// - `CLINREC_MAX_QUERY_ROWS`: Row cap for record listing and transforms (1 to 500, default 500)
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - a configuration value is invalid or the data directory cannot be opened,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("clinrec=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr =
        std::env::var("CLINREC_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let data_dir = data_dir_from_env_value(std::env::var("CLINREC_DATA_DIR").ok());
    let max_query_rows =
        max_query_rows_from_env_value(std::env::var("CLINREC_MAX_QUERY_ROWS").ok())?;
    let cfg = CoreConfig::new(data_dir, max_query_rows)?;

    match cfg.data_dir() {
        Some(dir) => tracing::info!("++ Using record store at {}", dir.display()),
        None => tracing::info!("++ Using in-memory record store"),
    }
    let store = cfg.open_store()?;

    let app = router(AppState::new(&cfg, store));

    tracing::info!("++ Starting clinical record REST API on {}", rest_addr);
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
