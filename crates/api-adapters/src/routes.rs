use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

const MAX_BLOB_BYTES: usize = 5 * 1024 * 1024;

fn cors_policy() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .max_age(Duration::from_secs(3600))
}

/// Mounts every operation under `/api`, plus `/health` and `/metrics`.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/publishTask", post(handlers::publish_task))
        .route("/submitOrConfirmTask", post(handlers::submit_or_confirm_task))
        .route("/revokeTask", post(handlers::revoke_task))
        .route("/listTasks", post(handlers::list_tasks))
        .route("/purchaseGift", post(handlers::purchase_gift))
        .route("/redeemItem", post(handlers::redeem_item))
        .route("/upsertGift", post(handlers::upsert_gift))
        .route("/listGifts", post(handlers::list_gifts))
        .route("/listItems", post(handlers::list_items))
        .route("/listExchangeHistory", post(handlers::list_exchange_history))
        .route("/listGiftUsageRecords", post(handlers::list_gift_usage_records))
        .route("/bindPartner", post(handlers::bind_partner))
        .route("/getOrCreateUser", post(handlers::get_or_create_user))
        .route("/updateProfile", post(handlers::update_profile))
        .route("/listRecords", post(handlers::list_records))
        .route("/listNotices", post(handlers::list_notices))
        .route("/markNoticesRead", post(handlers::mark_notices_read))
        .route("/blobs", post(handlers::upload_blob).layer(DefaultBodyLimit::max(MAX_BLOB_BYTES)))
        .route("/blobs/{blob_id}", get(handlers::resolve_blob));

    Router::new()
        .nest("/api", api)
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .layer(TraceLayer::new_for_http())
        .layer(cors_policy())
        .with_state(state)
}
