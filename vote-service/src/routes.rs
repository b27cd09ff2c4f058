//! HTTP routes

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    middleware,
    response::Json,
    routing::{get, post},
    Router,
};
use cli::utils::{normalize_address, parse_address};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::auth_middleware::admin_auth;
use crate::database::ProofRecord;
use crate::error::{ContentError, IngestError, ReindexError, VerifyError};
use crate::indexer::reindex_batch;
use crate::ingest::ingest_vote;
use crate::metrics;
use crate::state::AppState;
use crate::types::{BatchesResponse, ReindexResponse, ValidateRequest, VoteRequest, VoteResponse};
use crate::verifier::VerificationReport;

pub const BUILD_GIT_HASH: &str = env!("VOTE_SERVICE_BUILD_GIT_HASH");
pub const BUILD_TIME_UNIX: &str = env!("VOTE_SERVICE_BUILD_TIME_UNIX");

pub fn router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/admin/stats", get(admin_stats))
        .route("/admin/batches/{index}/reindex", post(admin_reindex))
        .route_layer(middleware::from_fn_with_state(state.clone(), admin_auth));

    Router::new()
        .route("/healthz", get(health_check))
        .route("/meta", get(get_meta))
        .route("/vote", post(submit_vote))
        .route("/validate-vote", post(validate_vote))
        .route("/proof/{voter}", get(get_proof))
        .route("/batches", get(list_batches))
        .merge(admin)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn internal(context: &str, err: impl std::fmt::Display) -> StatusCode {
    error!("{}: {}", context, err);
    StatusCode::INTERNAL_SERVER_ERROR
}

// Health check endpoint
async fn health_check() -> &'static str {
    "ok"
}

async fn get_meta(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    info!("GET /meta - Metadata requested");

    let pending = state
        .db
        .count_unclaimed()
        .await
        .map_err(|e| internal("count pending votes", e))?;
    let status = state
        .db
        .pipeline_status()
        .await
        .map_err(|e| internal("read pipeline state", e))?;
    let latest = state
        .db
        .latest_batch()
        .await
        .map_err(|e| internal("read latest batch", e))?;

    Ok(Json(json!({
        "batchThreshold": state.batch_threshold,
        "pendingVotes": pending,
        "inFlight": status.in_flight,
        "claimId": status.claim_id,
        "latestBatch": latest,
        "build": {
            "version": env!("CARGO_PKG_VERSION"),
            "gitHash": BUILD_GIT_HASH,
            "buildTimeUnix": BUILD_TIME_UNIX,
        }
    })))
}

async fn submit_vote(
    State(state): State<AppState>,
    body: Result<Json<VoteRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<VoteResponse>), StatusCode> {
    let Json(request) = body.map_err(|e| {
        info!("POST /vote - Rejected body: {}", e);
        StatusCode::BAD_REQUEST
    })?;
    info!("POST /vote - Vote from {}", request.voter);

    let vote = ingest_vote(
        &state.db,
        &state.trigger,
        &request.voter,
        request.choice_id,
        &request.signature,
    )
    .await
    .map_err(|e| match e {
        IngestError::Malformed(reason) => {
            info!("Malformed vote: {}", reason);
            StatusCode::BAD_REQUEST
        }
        IngestError::AlreadyPending | IngestError::AlreadyVoted => {
            info!("Duplicate vote from {}: {}", request.voter, e);
            StatusCode::CONFLICT
        }
        IngestError::Database(e) => internal("store pending vote", e),
    })?;

    Ok((
        StatusCode::CREATED,
        Json(VoteResponse {
            status: "pending",
            voter: vote.voter,
            choice_id: vote.choice_id,
        }),
    ))
}

async fn validate_vote(
    State(state): State<AppState>,
    body: Result<Json<ValidateRequest>, JsonRejection>,
) -> Result<Json<VerificationReport>, StatusCode> {
    let Json(request) = body.map_err(|e| {
        info!("POST /validate-vote - Rejected body: {}", e);
        StatusCode::BAD_REQUEST
    })?;
    info!(
        "POST /validate-vote - {} choice {}",
        request.voter, request.choice_id
    );

    let voter = parse_address(&request.voter).map_err(|e| {
        info!("Invalid voter: {}", e);
        StatusCode::BAD_REQUEST
    })?;

    let report = state
        .verifier
        .verify(voter, request.choice_id)
        .await
        .map_err(|e| match e {
            VerifyError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            VerifyError::Database(e) => internal("verify vote", e),
        })?;
    Ok(Json(report))
}

async fn get_proof(
    State(state): State<AppState>,
    Path(voter): Path<String>,
) -> Result<Json<ProofRecord>, StatusCode> {
    info!("GET /proof/{} - Proof requested", voter);

    let voter = normalize_address(&voter).map_err(|e| {
        info!("Invalid voter: {}", e);
        StatusCode::BAD_REQUEST
    })?;
    let record = state
        .db
        .get_proof_record(&voter)
        .await
        .map_err(|e| internal("read proof record", e))?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(record))
}

async fn list_batches(State(state): State<AppState>) -> Result<Json<BatchesResponse>, StatusCode> {
    info!("GET /batches - Batch list requested");
    let batches = state
        .db
        .list_batches()
        .await
        .map_err(|e| internal("list batches", e))?;
    Ok(Json(BatchesResponse { batches }))
}

async fn admin_stats(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    info!("GET /admin/stats - Metrics requested");
    let status = state
        .db
        .pipeline_status()
        .await
        .map_err(|e| internal("read pipeline state", e))?;

    let mut snapshot = metrics::snapshot_as_json(&state.db_path);
    snapshot["pipeline"] = json!(status);
    Ok(Json(snapshot))
}

async fn admin_reindex(
    State(state): State<AppState>,
    Path(index): Path<u64>,
) -> Result<Json<ReindexResponse>, StatusCode> {
    info!("POST /admin/batches/{}/reindex - Reindex requested", index);

    let committer = &state.committer;
    let proofs = reindex_batch(
        &state.db,
        committer.ledger().as_ref(),
        committer.settings().ledger_timeout,
        committer.content().as_ref(),
        index,
    )
    .await
    .map_err(|e| match e {
        ReindexError::UnknownBatch(_) => StatusCode::NOT_FOUND,
        ReindexError::Content(ContentError::Corrupt(_))
        | ReindexError::Unanchored(_)
        | ReindexError::StoredRootMismatch { .. }
        | ReindexError::RootMismatch { .. } => {
            info!("Refusing to reindex batch {}: {}", index, e);
            StatusCode::CONFLICT
        }
        ReindexError::Content(_) | ReindexError::Ledger(_) => {
            info!("Cannot reindex batch {} now: {}", index, e);
            StatusCode::SERVICE_UNAVAILABLE
        }
        e => internal("reindex batch", e),
    })?;

    Ok(Json(ReindexResponse {
        batch_index: index,
        proofs,
    }))
}
