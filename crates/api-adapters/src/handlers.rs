//! # Handlers
//!
//! One handler per operation. Each resolves the caller, converts the body,
//! runs the service call under [`AppState::observe`] and wraps the result
//! in the success envelope.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use domains::DomainError;
use mime::Mime;
use serde::Serialize;
use serde_json::{json, Value};
use services::{BindOutcome, GiftCommand, PurchaseRequest, TaskProgress};
use tracing::info;

use crate::dto::{
    AdvanceTaskRequest, BindPartnerRequest, ExchangeHistoryRequest, ItemIdRequest, ListNoticesRequest,
    MarkNoticesReadRequest, PageParams, PublishTaskRequest, PurchaseGiftRequest, TaskIdRequest, UpdateProfileRequest,
    UpsertGiftRequest, HISTORY_PAGE_SIZE, NOTICES_PAGE_SIZE, RECORDS_PAGE_SIZE, USAGE_PAGE_SIZE,
};
use crate::error::ApiError;
use crate::extract::{Caller, Payload};
use crate::state::AppState;

const OPENMETRICS: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// `{ "success": true, ...fields }`. Non-object bodies land under `data`.
#[derive(Debug)]
pub struct Success(Value);

impl Success {
    pub fn empty() -> Self {
        Success(json!({ "success": true }))
    }

    pub fn with(body: impl Serialize) -> Result<Self, ApiError> {
        let mut value = serde_json::to_value(body)?;
        match value.as_object_mut() {
            Some(fields) => {
                fields.insert("success".into(), Value::Bool(true));
                Ok(Success(value))
            }
            None => Ok(Success(json!({ "success": true, "data": value }))),
        }
    }
}

impl IntoResponse for Success {
    fn into_response(self) -> Response {
        Json(self.0).into_response()
    }
}

type Reply = Result<Success, ApiError>;

// ─── Tasks ──────────────────────────────────────────────────────────────────

pub async fn publish_task(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Payload(req): Payload<PublishTaskRequest>,
) -> Reply {
    let task = state.observe("publishTask", state.services.tasks.publish(&caller, req.into())).await?;
    Success::with(json!({ "id": task.id }))
}

pub async fn submit_or_confirm_task(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Payload(req): Payload<AdvanceTaskRequest>,
) -> Reply {
    let progress = state
        .observe("submitOrConfirmTask", async {
            let (task_id, action) = req.into_parts()?;
            state.services.tasks.advance(&caller, &task_id, action).await
        })
        .await?;
    match progress {
        TaskProgress::Submitted { status } => Success::with(json!({ "status": status })),
        TaskProgress::Confirmed { points } => Success::with(json!({ "points": points })),
    }
}

pub async fn revoke_task(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Payload(req): Payload<TaskIdRequest>,
) -> Reply {
    state
        .observe("revokeTask", async {
            let task_id = req.task_id()?;
            state.services.tasks.revoke(&caller, &task_id).await
        })
        .await?;
    Ok(Success::empty())
}

pub async fn list_tasks(State(state): State<AppState>, Caller(caller): Caller) -> Reply {
    let tasks = state.observe("listTasks", state.services.tasks.list(&caller)).await?;
    Success::with(tasks)
}

// ─── Gifts and items ────────────────────────────────────────────────────────

pub async fn purchase_gift(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Payload(req): Payload<PurchaseGiftRequest>,
) -> Reply {
    let item = state
        .observe("purchaseGift", async {
            let request = PurchaseRequest::try_from(req)?;
            state.services.gifts.purchase(&caller, request).await
        })
        .await?;
    Success::with(json!({ "itemId": item.id }))
}

pub async fn redeem_item(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Payload(req): Payload<ItemIdRequest>,
) -> Reply {
    state
        .observe("redeemItem", async {
            let item_id = req.item_id()?;
            state.services.gifts.redeem(&caller, &item_id).await
        })
        .await?;
    Ok(Success::empty())
}

pub async fn upsert_gift(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Payload(req): Payload<UpsertGiftRequest>,
) -> Reply {
    let created = state
        .observe("upsertGift", async {
            let command = GiftCommand::try_from(req)?;
            state.services.gifts.upsert(&caller, command).await
        })
        .await?;
    match created {
        Some(id) => Success::with(json!({ "id": id })),
        None => Ok(Success::empty()),
    }
}

pub async fn list_gifts(State(state): State<AppState>, Caller(caller): Caller) -> Reply {
    let gifts = state.observe("listGifts", state.services.gifts.list(&caller)).await?;
    Success::with(gifts)
}

pub async fn list_items(State(state): State<AppState>, Caller(caller): Caller) -> Reply {
    let items = state.observe("listItems", state.services.gifts.list_items(&caller)).await?;
    Success::with(items)
}

pub async fn list_exchange_history(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Payload(req): Payload<ExchangeHistoryRequest>,
) -> Reply {
    let page = services::PageRequest::new(req.page, req.page_size, HISTORY_PAGE_SIZE);
    let history = state
        .observe("listExchangeHistory", state.services.history.exchange_history(&caller, req.filter.into(), page))
        .await?;
    Success::with(history)
}

pub async fn list_gift_usage_records(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Payload(req): Payload<PageParams>,
) -> Reply {
    let usage = state
        .observe("listGiftUsageRecords", state.services.history.gift_usage(&caller, req.request(USAGE_PAGE_SIZE)))
        .await?;
    Success::with(usage)
}

// ─── Pairing and profile ────────────────────────────────────────────────────

pub async fn bind_partner(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Payload(req): Payload<BindPartnerRequest>,
) -> Reply {
    let outcome = state.observe("bindPartner", state.services.pairing.bind(&caller, &req.partner_code)).await?;
    let body = match &outcome {
        BindOutcome::Bound { partner_id } => json!({ "message": "bound successfully", "partnerId": partner_id }),
        BindOutcome::AlreadyBound { partner_id } => {
            json!({ "message": "already bound to this partner", "alreadyBound": true, "partnerId": partner_id })
        }
        BindOutcome::Repaired { partner_id } => json!({ "message": "binding repaired", "partnerId": partner_id }),
    };
    Success::with(body)
}

pub async fn get_or_create_user(State(state): State<AppState>, Caller(caller): Caller) -> Reply {
    let profile = state.observe("getOrCreateUser", state.services.users.get_or_create(&caller)).await?;
    Success::with(profile)
}

pub async fn update_profile(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Payload(req): Payload<UpdateProfileRequest>,
) -> Reply {
    let user = state.observe("updateProfile", state.services.users.update_profile(&caller, req.into())).await?;
    Success::with(json!({ "user": user }))
}

pub async fn list_records(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Payload(req): Payload<PageParams>,
) -> Reply {
    let records = state
        .observe("listRecords", state.services.users.list_records(&caller, req.request(RECORDS_PAGE_SIZE)))
        .await?;
    Success::with(records)
}

pub async fn list_notices(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Payload(req): Payload<ListNoticesRequest>,
) -> Reply {
    let page = services::PageRequest::new(req.page, req.page_size, NOTICES_PAGE_SIZE);
    let notices = state
        .observe("listNotices", state.services.users.list_notices(&caller, req.unread_only, page))
        .await?;
    Success::with(notices)
}

pub async fn mark_notices_read(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Payload(req): Payload<MarkNoticesReadRequest>,
) -> Reply {
    let updated = state
        .observe("markNoticesRead", state.services.users.mark_notices_read(&caller, req.notice_ids))
        .await?;
    Success::with(json!({ "updated": updated }))
}

// ─── Blobs ──────────────────────────────────────────────────────────────────

fn accepted_image(headers: &HeaderMap) -> Result<Mime, ApiError> {
    let content_type: Mime = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
        .ok_or_else(|| ApiError::BadRequest("content type is required".into()))?;
    let supported = content_type.type_() == mime::IMAGE
        && matches!(content_type.subtype().as_str(), "png" | "jpeg" | "jpg" | "gif" | "webp");
    if !supported {
        return Err(ApiError::BadRequest(format!("unsupported content type {content_type}")));
    }
    Ok(content_type)
}

/// `POST /api/blobs`: raw image bytes in, `{ id, url }` out.
pub async fn upload_blob(
    State(state): State<AppState>,
    Caller(caller): Caller,
    headers: HeaderMap,
    body: Bytes,
) -> Reply {
    let content_type = accepted_image(&headers)?;
    if body.is_empty() {
        return Err(ApiError::BadRequest("empty upload".into()));
    }
    let size = body.len();
    let id = state.blobs.put(body, content_type).await.map_err(ApiError::Blob)?;
    let url = state.blobs.resolve(&id).await.unwrap_or_default();
    info!(caller = %caller, blob_id = %id, size, "blob stored");
    Success::with(json!({ "id": id, "url": url }))
}

pub async fn resolve_blob(State(state): State<AppState>, _caller: Caller, Path(blob_id): Path<String>) -> Reply {
    let url = state.blobs.resolve(&blob_id).await.ok_or(DomainError::NotFound("blob"))?;
    Success::with(json!({ "id": blob_id, "url": url }))
}

// ─── Operations ─────────────────────────────────────────────────────────────

pub async fn health() -> impl IntoResponse {
    "OK"
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(text) => ([(CONTENT_TYPE, HeaderValue::from_static(OPENMETRICS))], text).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}
