use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use carteira_core::domain::analysis::{AssetAnalysis, Recommendation};
use carteira_core::review::{ReviewOrchestrator, RunOutcome, RunStatus};
use carteira_core::storage::{AnalysisStore, InMemoryAnalysisStore, PgAnalysisStore};
use carteira_core::time::schedule::ReviewSchedule;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = carteira_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let pool = connect_db(&settings).await;
    let store: Arc<dyn AnalysisStore> = match &pool {
        Some(pool) => Arc::new(PgAnalysisStore::new(pool.clone())),
        None => {
            tracing::warn!("no database; analyses are kept in memory and lost on restart");
            Arc::new(InMemoryAnalysisStore::new())
        }
    };

    let orchestrator = Arc::new(carteira_core::review::build_orchestrator(
        &settings,
        store.clone(),
        pool,
    )?);

    if carteira_core::config::env_or("REVIEW_SCHEDULER_ENABLED", true) {
        let schedule = ReviewSchedule::from_env()?;
        carteira_core::review::spawn_review_timer(orchestrator.clone(), schedule);
    }

    let state = AppState {
        orchestrator,
        store,
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/reviews/status", get(get_status))
        .route("/reviews/run", post(run_full))
        .route("/reviews/run/:portfolio", post(run_portfolio))
        .route("/reviews/run/:portfolio/:ticker", post(run_asset))
        .route("/analyses/pending", get(list_pending))
        .route("/analyses/recommendation/:rec", get(list_by_recommendation))
        .route("/analyses/:ticker", get(get_active))
        .route("/analyses/:ticker/history", get(list_history))
        .route("/portfolios/:name/analyses", get(list_by_portfolio))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port: u16 = carteira_core::config::env_or("PORT", 3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn connect_db(settings: &carteira_core::config::Settings) -> Option<PgPool> {
    let db_url = match settings.require_database_url() {
        Ok(url) => url,
        Err(e) => {
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            return None;
        }
    };

    let pool = match sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            let err = anyhow::Error::new(e);
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
            return None;
        }
    };

    match carteira_core::storage::migrate(&pool).await {
        Ok(()) => Some(pool),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
            None
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<ReviewOrchestrator>,
    store: Arc<dyn AnalysisStore>,
}

fn internal_error(e: anyhow::Error) -> StatusCode {
    sentry_anyhow::capture_anyhow(&e);
    tracing::error!(error = %e, "request failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

fn outcome_response(outcome: RunOutcome) -> Result<Json<Vec<AssetAnalysis>>, StatusCode> {
    match outcome {
        RunOutcome::Completed(analyses) => Ok(Json(analyses)),
        RunOutcome::AlreadyRunning => Err(StatusCode::CONFLICT),
        RunOutcome::Aborted(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

async fn get_status(State(state): State<AppState>) -> Json<RunStatus> {
    Json(state.orchestrator.status())
}

async fn run_full(State(state): State<AppState>) -> Result<Json<Vec<AssetAnalysis>>, StatusCode> {
    outcome_response(state.orchestrator.run_detached(None).await)
}

async fn run_portfolio(
    State(state): State<AppState>,
    Path(portfolio): Path<String>,
) -> Result<Json<Vec<AssetAnalysis>>, StatusCode> {
    outcome_response(state.orchestrator.run_detached(Some(portfolio)).await)
}

async fn run_asset(
    State(state): State<AppState>,
    Path((portfolio, ticker)): Path<(String, String)>,
) -> Result<Json<AssetAnalysis>, StatusCode> {
    state
        .orchestrator
        .run_asset(&ticker, &portfolio)
        .await
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn get_active(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<AssetAnalysis>, StatusCode> {
    state
        .store
        .get_active(&normalize_ticker(&ticker))
        .await
        .map_err(internal_error)?
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn list_history(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<Vec<AssetAnalysis>>, StatusCode> {
    let rows = state
        .store
        .list_history(&normalize_ticker(&ticker))
        .await
        .map_err(internal_error)?;
    Ok(Json(rows))
}

async fn list_by_portfolio(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<AssetAnalysis>>, StatusCode> {
    let rows = state
        .store
        .list_by_portfolio(&name)
        .await
        .map_err(internal_error)?;
    Ok(Json(rows))
}

async fn list_pending(State(state): State<AppState>) -> Result<Json<Vec<AssetAnalysis>>, StatusCode> {
    let rows = state
        .store
        .list_pending_review(chrono::Utc::now())
        .await
        .map_err(internal_error)?;
    Ok(Json(rows))
}

async fn list_by_recommendation(
    State(state): State<AppState>,
    Path(rec): Path<String>,
) -> Result<Json<Vec<AssetAnalysis>>, StatusCode> {
    let rec = rec
        .parse::<Recommendation>()
        .map_err(|_| StatusCode::BAD_REQUEST)?;
    let rows = state
        .store
        .list_by_recommendation(rec)
        .await
        .map_err(internal_error)?;
    Ok(Json(rows))
}

fn normalize_ticker(ticker: &str) -> String {
    ticker.trim().to_ascii_uppercase()
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &carteira_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
