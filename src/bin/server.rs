use std::{net::SocketAddr, process::ExitCode, time::Duration};

use axum::{
    Router,
    extract::{MatchedPath, Request},
    middleware,
};
use axum_server::Handle;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use finance_tracker::{
    AppConfig, AppState, SqliteDocumentStore, Timeouts, build_router, graceful_shutdown,
    logging_middleware, spawn_balance_recalculation,
};

/// The REST API server for finance_tracker.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long, env = "DB_PATH")]
    db_path: String,

    /// The port to serve the API from.
    #[arg(short, long, env = "SERVER_PORT", default_value_t = 8080)]
    port: u16,

    /// The token clients must send in the `x-api-key` header.
    ///
    /// If unset, every request is refused.
    #[arg(long, env = "API_TOKEN")]
    api_token: Option<String>,

    /// The time limit for CRUD and ledger database calls, in milliseconds.
    #[arg(long, env = "TIMEOUT_MS_DATABASE", default_value_t = 5_000)]
    timeout_ms_database: u64,

    /// The time limit for running a report, in milliseconds.
    #[arg(long, env = "TIMEOUT_MS_REPORT", default_value_t = 30_000)]
    timeout_ms_report: u64,

    /// How often account balances are recomputed from scratch, in seconds.
    #[arg(long, env = "RECALCULATE_INTERVAL_SECS", default_value_t = 180)]
    recalculate_interval_secs: u64,

    /// Log every request and response body.
    #[arg(long, env = "LOG_BODIES", default_value_t = false)]
    log_bodies: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    setup_logging();

    let args = Args::parse();

    let store = match SqliteDocumentStore::open(&args.db_path) {
        Ok(store) => store,
        Err(error) => {
            tracing::error!("Could not open the database at {}: {error}", args.db_path);
            return ExitCode::FAILURE;
        }
    };

    if args.api_token.is_none() {
        tracing::warn!("API_TOKEN is not set, every request will be refused");
    }

    let config = AppConfig {
        api_token: args.api_token,
        timeouts: Timeouts {
            database: Duration::from_millis(args.timeout_ms_database),
            report: Duration::from_millis(args.timeout_ms_report),
        },
    };
    let state = AppState::new(store, config);

    spawn_balance_recalculation(
        state.ledger.clone(),
        Duration::from_secs(args.recalculate_interval_secs),
    );

    let handle = Handle::new();
    tokio::spawn(graceful_shutdown(handle.clone()));

    let router = build_router(state);
    let router = if args.log_bodies {
        router.layer(middleware::from_fn(logging_middleware))
    } else {
        router
    };
    let router = add_tracing_layer(router);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    tracing::info!("HTTP server listening on {}", addr);

    if let Err(error) = axum_server::bind(addr)
        .handle(handle)
        .serve(router.into_make_service())
        .await
    {
        tracing::error!("Server error: {error}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn add_tracing_layer(router: Router) -> Router {
    let tracing_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request| {
            let method = req.method();
            let uri = req.uri();

            let matched_path = req
                .extensions()
                .get::<MatchedPath>()
                .map(|matched_path| matched_path.as_str());

            tracing::debug_span!("request", %method, %uri, matched_path)
        })
        // By default, `TraceLayer` will log 5xx responses but we're doing our specific
        // logging of errors so disable that
        .on_failure(());

    router.layer(tracing_layer)
}
