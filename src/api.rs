//! HTTP API for the CCNL Cost Engine.
//!
//! This module exposes the calculator, the comparison assembler, the
//! agreement catalog and the template renderer over a JSON REST API
//! built with [`axum`](https://crates.io/crates/axum).  Handlers are
//! stateless apart from the shared [`AppState`]; catalog access runs
//! on tokio's blocking pool because the repository is synchronous.

use crate::calculator::{calculate_cost, PercentageRulePolicy};
use crate::catalog::{load_agreements_from_dir, AgreementRepository, AgreementSummary, CatalogQuery, Page};
use crate::comparison::{compare, level_cost_table, resolve_level, Comparison, ComparisonRequest, LevelCost};
use crate::config::AppConfig;
use crate::error::{CatalogError, CostError, ShareError};
use crate::models::{Agreement, CostCalculation, EmploymentType};
use crate::share;
use crate::store::SqliteCatalog;
use crate::template::{self, Rendered};
use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Application state shared across requests.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn AgreementRepository>,
    pub policy: PercentageRulePolicy,
}

impl AppState {
    pub fn new(catalog: Arc<dyn AgreementRepository>, policy: PercentageRulePolicy) -> Self {
        Self { catalog, policy }
    }

    /// Runs a repository operation on the blocking pool.
    async fn with_catalog<T, F>(&self, op: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn AgreementRepository) -> Result<T, CatalogError> + Send + 'static,
    {
        let catalog = Arc::clone(&self.catalog);
        tokio::task::spawn_blocking(move || op(catalog.as_ref()))
            .await
            .map_err(|err| ApiError::internal(format!("catalog task failed: {err}")))?
            .map_err(ApiError::from)
    }
}

/// Error returned by handlers, rendered as `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, error = %self.message, "request failed");
        }
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<CostError> for ApiError {
    fn from(err: CostError) -> Self {
        let status = match err {
            CostError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            CostError::NoLevels(_) => StatusCode::UNPROCESSABLE_ENTITY,
        };
        Self::new(status, err.to_string())
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        let status = match err {
            CatalogError::NotFound(_) => StatusCode::NOT_FOUND,
            CatalogError::Invalid(_) => StatusCode::BAD_REQUEST,
            CatalogError::Storage(_) | CatalogError::Corrupt { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<ShareError> for ApiError {
    fn from(err: ShareError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, err.to_string())
    }
}

/// Body of `POST /api/calculate`: either a stored agreement by key or
/// an unsaved agreement supplied inline.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CalculateRequest {
    Stored {
        agreement_key: String,
        #[serde(default)]
        level_index: usize,
        #[serde(default)]
        part_time: bool,
    },
    Inline {
        agreement: Box<Agreement>,
        #[serde(default)]
        level_index: usize,
        #[serde(default)]
        part_time: bool,
    },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CalculateResponse {
    pub agreement_key: String,
    pub level_index: usize,
    pub level_code: String,
    pub employment: EmploymentType,
    pub calculation: CostCalculation,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LevelCostParams {
    pub part_time: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ShareResponse {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct RenderRequest {
    pub template: String,
    #[serde(default)]
    pub values: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct PlaceholdersRequest {
    pub template: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PlaceholdersResponse {
    pub placeholders: Vec<String>,
}

/// Build the API router over the given state.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/agreements", get(list_agreements_handler))
        .route(
            "/api/agreements/:key",
            get(get_agreement_handler)
                .put(put_agreement_handler)
                .delete(delete_agreement_handler),
        )
        .route("/api/agreements/:key/costs", get(level_costs_handler))
        .route("/api/export/agreements", get(export_agreements_handler))
        .route("/api/calculate", post(calculate_handler))
        .route("/api/compare", post(compare_handler))
        .route("/api/share", post(share_handler))
        .route("/api/share/:token", get(shared_comparison_handler))
        .route("/api/templates/render", post(render_handler))
        .route("/api/templates/placeholders", post(placeholders_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Handler for GET /api/agreements
async fn list_agreements_handler(
    State(state): State<AppState>,
    Query(query): Query<CatalogQuery>,
) -> Result<Json<Page<AgreementSummary>>, ApiError> {
    let page = state.with_catalog(move |catalog| catalog.query(&query)).await?;
    Ok(Json(page))
}

/// Handler for GET /api/export/agreements: every agreement in full,
/// unpaged.
async fn export_agreements_handler(State(state): State<AppState>) -> Result<Json<Vec<Agreement>>, ApiError> {
    let agreements = state.with_catalog(|catalog| catalog.list_all()).await?;
    info!(count = agreements.len(), "exported catalog");
    Ok(Json(agreements))
}

async fn get_agreement_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Agreement>, ApiError> {
    let agreement = state.with_catalog(move |catalog| catalog.get(&key)).await?;
    Ok(Json(agreement))
}

/// Handler for PUT /api/agreements/:key.  The key in the path wins
/// over the one in the body.
async fn put_agreement_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(mut agreement): Json<Agreement>,
) -> Result<Json<Agreement>, ApiError> {
    agreement.key = key;
    let stored = state
        .with_catalog(move |catalog| {
            catalog.upsert(&agreement)?;
            catalog.get(&agreement.key)
        })
        .await?;
    info!(key = %stored.key, custom = stored.is_custom(), "agreement saved");
    Ok(Json(stored))
}

async fn delete_agreement_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.with_catalog(move |catalog| catalog.delete(&key)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for GET /api/agreements/:key/costs
async fn level_costs_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<LevelCostParams>,
) -> Result<Json<Vec<LevelCost>>, ApiError> {
    let agreement = state.with_catalog(move |catalog| catalog.get(&key)).await?;
    let employment = EmploymentType::from_part_time(params.part_time);
    let table = level_cost_table(&agreement, employment, state.policy)?;
    Ok(Json(table))
}

/// Handler for POST /api/calculate
async fn calculate_handler(
    State(state): State<AppState>,
    Json(request): Json<CalculateRequest>,
) -> Result<Json<CalculateResponse>, ApiError> {
    let (agreement, level_index, part_time) = match request {
        CalculateRequest::Stored {
            agreement_key,
            level_index,
            part_time,
        } => {
            let agreement = state
                .with_catalog(move |catalog| catalog.get(&agreement_key))
                .await?;
            (agreement, level_index, part_time)
        }
        CalculateRequest::Inline {
            agreement,
            level_index,
            part_time,
        } => (*agreement, level_index, part_time),
    };
    let (index, level, reset) = resolve_level(&agreement, level_index)?;
    if reset {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!(
                "agreement `{}` has no level at index {level_index}",
                agreement.key
            ),
        ));
    }
    let employment = EmploymentType::from_part_time(part_time);
    let calculation = calculate_cost(
        level.base_salary,
        &agreement.additional_costs,
        Some(&agreement),
        employment,
        state.policy,
    )?;
    Ok(Json(CalculateResponse {
        agreement_key: agreement.key.clone(),
        level_index: index,
        level_code: level.code.clone(),
        employment,
        calculation,
    }))
}

/// Handler for POST /api/compare
async fn compare_handler(
    State(state): State<AppState>,
    Json(request): Json<ComparisonRequest>,
) -> Result<Json<Comparison>, ApiError> {
    Ok(Json(run_comparison(&state, request).await?))
}

/// Handler for POST /api/share
async fn share_handler(Json(request): Json<ComparisonRequest>) -> Json<ShareResponse> {
    Json(ShareResponse {
        token: share::encode(&request),
    })
}

/// Handler for GET /api/share/:token
async fn shared_comparison_handler(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<Comparison>, ApiError> {
    let request = share::decode(&token).inspect_err(|_| warn!("rejected share token"))?;
    Ok(Json(run_comparison(&state, request).await?))
}

async fn render_handler(Json(request): Json<RenderRequest>) -> Json<Rendered> {
    Json(template::render(&request.template, &request.values))
}

async fn placeholders_handler(Json(request): Json<PlaceholdersRequest>) -> Json<PlaceholdersResponse> {
    Json(PlaceholdersResponse {
        placeholders: template::placeholders(&request.template),
    })
}

async fn run_comparison(state: &AppState, request: ComparisonRequest) -> Result<Comparison, ApiError> {
    let keys = (
        request.first.agreement_key.clone(),
        request.second.agreement_key.clone(),
    );
    let (first, second) = state
        .with_catalog(move |catalog| Ok((catalog.get(&keys.0)?, catalog.get(&keys.1)?)))
        .await?;
    Ok(compare(&first, &second, &request, state.policy)?)
}

/// Opens the catalog described by `config` and loads seed agreements.
pub fn open_catalog(config: &AppConfig) -> Result<SqliteCatalog> {
    let catalog = if config.in_memory() {
        SqliteCatalog::open_in_memory()
    } else {
        SqliteCatalog::open(&config.database)
    }
    .context("opening agreement catalog")?;
    if let Some(dir) = &config.seed_dir {
        let agreements = load_agreements_from_dir(dir)?;
        let inserted = catalog.seed(&agreements).context("seeding agreement catalog")?;
        info!(dir = %dir.display(), found = agreements.len(), inserted, "seeded catalog");
    }
    Ok(catalog)
}

/// Launch the API server.  Binds to the configured address and runs
/// until interrupted.
pub async fn serve(config: AppConfig) -> Result<()> {
    let catalog = open_catalog(&config)?;
    let state = AppState::new(Arc::new(catalog), config.percentage_rules);
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, policy = ?config.percentage_rules, "server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(%err, "failed to listen for shutdown signal");
            }
        })
        .await
        .context("running server")
}
