use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, patch, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use super::observability::ObservabilitySnapshot;
use super::state_file::{AccountRecord, LedgerStateFile};
use super::{LedgerError, PointLedger, TransactionRecord, UserBalance};

#[derive(Clone)]
pub struct LedgerHttpState {
    ledger: Arc<PointLedger>,
    admin_token: Option<String>,
    state_file: Option<PathBuf>,
}

impl LedgerHttpState {
    pub fn new(ledger: PointLedger) -> Self {
        Self {
            ledger: Arc::new(ledger),
            admin_token: None,
            state_file: None,
        }
    }

    pub fn with_admin_token(mut self, token: impl Into<String>) -> Self {
        self.admin_token = Some(token.into());
        self
    }

    pub fn with_state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_file = Some(path.into());
        self
    }
}

#[derive(Debug, Deserialize)]
struct AmountRequest {
    amount: i64,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct MetricsResponse {
    #[serde(flatten)]
    counters: ObservabilitySnapshot,
    key_locks: usize,
}

pub fn router(state: LedgerHttpState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/point/:id/charge", patch(charge_point))
        .route("/point/:id/use", patch(use_point))
        .route("/point/:id", get(select_point))
        .route("/point/:id/histories", get(select_histories));

    if state.admin_token.is_some() {
        router = router.route("/admin/accounts/:id", put(upsert_account));
    }

    router.with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn metrics(State(state): State<LedgerHttpState>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        counters: state.ledger.observability(),
        key_locks: state.ledger.locks().len(),
    })
}

async fn charge_point(
    State(state): State<LedgerHttpState>,
    Path(id): Path<i64>,
    Json(payload): Json<AmountRequest>,
) -> Result<Json<UserBalance>, (StatusCode, Json<ErrorResponse>)> {
    state
        .ledger
        .charge(id, payload.amount)
        .await
        .map(Json)
        .map_err(map_ledger_error)
}

async fn use_point(
    State(state): State<LedgerHttpState>,
    Path(id): Path<i64>,
    Json(payload): Json<AmountRequest>,
) -> Result<Json<UserBalance>, (StatusCode, Json<ErrorResponse>)> {
    state
        .ledger
        .use_points(id, payload.amount)
        .await
        .map(Json)
        .map_err(map_ledger_error)
}

async fn select_point(
    State(state): State<LedgerHttpState>,
    Path(id): Path<i64>,
) -> Result<Json<UserBalance>, (StatusCode, Json<ErrorResponse>)> {
    state
        .ledger
        .balance(id)
        .await
        .map(Json)
        .map_err(map_ledger_error)
}

async fn select_histories(
    State(state): State<LedgerHttpState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<TransactionRecord>>, (StatusCode, Json<ErrorResponse>)> {
    state
        .ledger
        .history(id)
        .await
        .map(Json)
        .map_err(map_ledger_error)
}

async fn upsert_account(
    State(state): State<LedgerHttpState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(payload): Json<AmountRequest>,
) -> Result<Json<UserBalance>, (StatusCode, Json<ErrorResponse>)> {
    require_admin(&state, &headers)?;

    let seeded = state
        .ledger
        .seed_account(id, payload.amount)
        .await
        .map_err(map_ledger_error)?;

    if let Some(path) = state.state_file.as_ref() {
        let mut file = LedgerStateFile::load(path).unwrap_or_default();
        file.upsert(AccountRecord {
            id: seeded.id,
            amount: seeded.amount,
        });
        if let Err(err) = file.save(path) {
            return Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_error",
                err.to_string(),
            ));
        }
    }

    tracing::info!(user = id, amount = seeded.amount, "admin account upsert");
    Ok(Json(seeded))
}

fn require_admin(
    state: &LedgerHttpState,
    headers: &HeaderMap,
) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    let expected = state.admin_token.as_deref().ok_or_else(|| {
        error_response(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "admin access disabled",
        )
    })?;
    if extract_header(headers, "x-admin-token").as_deref() == Some(expected) {
        Ok(())
    } else {
        Err(error_response(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "missing or invalid admin token",
        ))
    }
}

fn extract_header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn map_ledger_error(err: LedgerError) -> (StatusCode, Json<ErrorResponse>) {
    let (status, code) = match &err {
        LedgerError::UserNotFound { .. } => (StatusCode::NOT_FOUND, "user_not_found"),
        LedgerError::InvalidAmount { .. } => (StatusCode::BAD_REQUEST, "invalid_amount"),
        LedgerError::InsufficientBalance { .. } => {
            (StatusCode::PAYMENT_REQUIRED, "insufficient_balance")
        }
        LedgerError::LockTimeout { .. } => (StatusCode::CONFLICT, "lock_timeout"),
    };
    error_response(status, code, err.to_string())
}

fn error_response(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: ErrorDetail {
                code,
                message: message.into(),
            },
        }),
    )
}
