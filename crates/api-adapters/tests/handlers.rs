//! Drives the router end to end over the in-memory store.

use std::sync::Arc;

use api_adapters::{router, AppState};
use auth_adapters::JwtSessions;
use axum::body::{to_bytes, Body};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Request, StatusCode};
use axum::Router;
use domains::Store;
use secrecy::SecretString;
use serde_json::{json, Value};
use services::Services;
use storage_adapters::{LocalBlobStore, LogPushGateway, MemoryDocumentStore};
use tempfile::TempDir;
use tower::ServiceExt;

const ALICE: &str = "user-alice1";
const BOB: &str = "user-bobby2";

struct Harness {
    app: Router,
    jwt: Arc<JwtSessions>,
    _blob_dir: TempDir,
}

impl Harness {
    fn new() -> Self {
        let store = Store::new(Arc::new(MemoryDocumentStore::new()));
        let services = Services::new(store, Arc::new(LogPushGateway::default()));
        let jwt = Arc::new(JwtSessions::new(&SecretString::from("handler-test-secret".to_string()), 3600));
        let blob_dir = tempfile::tempdir().unwrap();
        let blobs = Arc::new(LocalBlobStore::new(blob_dir.path(), "/static/blobs"));
        let state = AppState::new(services, jwt.clone(), blobs);
        Self { app: router(state), jwt, _blob_dir: blob_dir }
    }

    fn bearer(&self, user: &str) -> String {
        format!("Bearer {}", self.jwt.issue(user).unwrap())
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, Vec<u8>) {
        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    async fn call_raw(&self, user: Option<&str>, operation: &str, body: impl Into<Body>) -> (StatusCode, Value) {
        let mut req = Request::builder()
            .method("POST")
            .uri(format!("/api/{operation}"))
            .header(CONTENT_TYPE, "application/json");
        if let Some(user) = user {
            req = req.header(AUTHORIZATION, self.bearer(user));
        }
        let (status, bytes) = self.send(req.body(body.into()).unwrap()).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn call(&self, user: &str, operation: &str, body: Value) -> (StatusCode, Value) {
        self.call_raw(Some(user), operation, body.to_string()).await
    }

    /// Creates both users and binds them.
    async fn paired(&self) {
        self.call(ALICE, "getOrCreateUser", json!({})).await;
        self.call(BOB, "getOrCreateUser", json!({})).await;
        let (status, body) = self.call(BOB, "bindPartner", json!({ "partnerCode": "alice1" })).await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }
}

#[tokio::test]
async fn requests_without_a_valid_session_are_rejected() {
    let h = Harness::new();

    let (status, body) = h.call_raw(None, "listTasks", "{}").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "success": false, "message": "missing credentials" }));

    let req = Request::builder()
        .method("POST")
        .uri("/api/listTasks")
        .header(AUTHORIZATION, "Bearer forged.token.value")
        .body(Body::empty())
        .unwrap();
    let (status, _) = h.send(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn reward_task_lifecycle() {
    let h = Harness::new();

    let (_, profile) = h.call(ALICE, "getOrCreateUser", json!({})).await;
    assert_eq!(profile["success"], true);
    assert_eq!(profile["inviteCode"], "ALICE1");
    assert_eq!(profile["user"]["totalPoints"], 0);

    h.call(BOB, "getOrCreateUser", json!({})).await;
    let (_, bound) = h.call(BOB, "bindPartner", json!({ "partnerCode": " alice1 " })).await;
    assert_eq!(bound["success"], true);
    assert!(bound.get("alreadyBound").is_none());
    let (_, again) = h.call(ALICE, "bindPartner", json!({ "partnerCode": "BOBBY2" })).await;
    assert_eq!(again["alreadyBound"], true);

    let (status, published) = h
        .call(ALICE, "publishTask", json!({ "title": "wash dishes", "points": 30, "type": "reward", "targetId": BOB }))
        .await;
    assert_eq!(status, StatusCode::OK, "{published}");
    let task_id = published["id"].as_str().unwrap().to_string();

    let (_, submitted) = h.call(BOB, "submitOrConfirmTask", json!({ "taskId": task_id })).await;
    assert_eq!(submitted["status"], "waiting_confirmation");

    let (_, confirmed) = h.call(ALICE, "submitOrConfirmTask", json!({ "taskId": task_id })).await;
    assert_eq!(confirmed, json!({ "success": true, "points": 30 }));

    let (status, twice) = h.call(ALICE, "submitOrConfirmTask", json!({ "taskId": task_id, "action": "confirm" })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(twice["success"], false);

    let (_, bob) = h.call(BOB, "getOrCreateUser", json!({})).await;
    assert_eq!(bob["user"]["totalPoints"], 30);
    assert_eq!(bob["todayChange"], 30);
    assert_eq!(bob["partner"]["id"], ALICE);

    let (_, records) = h.call(BOB, "listRecords", json!({})).await;
    assert_eq!(records["data"].as_array().unwrap().len(), 1);
    assert_eq!(records["data"][0]["amount"], 30);

    let (_, notices) = h.call(ALICE, "listNotices", json!({ "unreadOnly": true })).await;
    let kinds: Vec<&str> = notices["data"].as_array().unwrap().iter().map(|n| n["type"].as_str().unwrap()).collect();
    assert!(kinds.contains(&"BIND_SUCCESS") && kinds.contains(&"TASK_SUBMITTED"), "{kinds:?}");
    let (_, marked) = h.call(ALICE, "markNoticesRead", json!({})).await;
    assert_eq!(marked["updated"], kinds.len());
}

#[tokio::test]
async fn purchase_and_redeem_over_http() {
    let h = Harness::new();
    h.paired().await;

    let (_, published) =
        h.call(ALICE, "publishTask", json!({ "title": "laundry", "points": 50, "type": "reward", "targetId": BOB })).await;
    let task_id = published["id"].as_str().unwrap();
    h.call(ALICE, "submitOrConfirmTask", json!({ "taskId": task_id, "action": "confirm" })).await;

    let (_, added) =
        h.call(ALICE, "upsertGift", json!({ "action": "add", "giftData": { "name": "massage", "points": 40 } })).await;
    let gift_id = added["id"].as_str().unwrap().to_string();

    let (_, gifts) = h.call(BOB, "listGifts", json!({})).await;
    assert_eq!(gifts["data"][0]["id"], gift_id.as_str());

    let (status, bought) = h.call(BOB, "purchaseGift", json!({ "giftId": gift_id })).await;
    assert_eq!(status, StatusCode::OK, "{bought}");
    let item_id = bought["itemId"].as_str().unwrap().to_string();

    let (status, broke) = h.call(BOB, "purchaseGift", json!({ "giftId": gift_id })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(broke["message"], "insufficient points");

    let (status, _) = h.call(BOB, "redeemItem", json!({ "itemId": item_id })).await;
    assert_eq!(status, StatusCode::OK);
    let (status, used) = h.call(BOB, "redeemItem", json!({ "itemId": item_id })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(used["message"], "item has already been used");

    let (_, history) = h.call(BOB, "listExchangeHistory", json!({ "filter": "used" })).await;
    assert_eq!(history["total"], 1);
    assert_eq!(history["pageSize"], 20);
    assert_eq!(history["data"][0]["name"], "massage");

    let (_, usage) = h.call(ALICE, "listGiftUsageRecords", json!({})).await;
    assert_eq!(usage["data"][0]["direction"], "received");
}

#[tokio::test]
async fn out_of_range_pages_come_back_empty() {
    let h = Harness::new();
    h.paired().await;
    let (_, published) =
        h.call(ALICE, "publishTask", json!({ "title": "dishes", "points": 5, "type": "reward", "targetId": BOB })).await;
    h.call(ALICE, "submitOrConfirmTask", json!({ "taskId": published["id"], "action": "confirm" })).await;

    for operation in ["listRecords", "listExchangeHistory", "listGiftUsageRecords", "listNotices"] {
        let (status, body) = h.call(BOB, operation, json!({ "page": u64::MAX, "pageSize": 50 })).await;
        assert_eq!(status, StatusCode::OK, "{operation}: {body}");
        assert_eq!(body["success"], true);
        assert!(body["data"].as_array().unwrap().is_empty(), "{operation}: {body}");
    }

    let (_, history) = h.call(BOB, "listExchangeHistory", json!({ "page": u64::MAX })).await;
    assert_eq!(history["hasMore"], false);
}

#[tokio::test]
async fn shape_and_lookup_errors_use_the_envelope() {
    let h = Harness::new();
    h.paired().await;

    let (status, body) = h.call_raw(Some(ALICE), "publishTask", "not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = h.call(ALICE, "publishTask", json!({ "title": "x", "points": 5, "type": "bonus" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = h.call(ALICE, "publishTask", json!({ "title": "  ", "points": 5, "type": "reward" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "title is required");

    let (status, body) = h.call(ALICE, "revokeTask", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "taskId is required");

    let (status, body) = h.call(ALICE, "revokeTask", json!({ "taskId": "nope" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "task not found");

    let (status, _) =
        h.call(ALICE, "publishTask", json!({ "title": "x", "points": 5, "type": "reward", "targetId": "stranger" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn health_and_metrics() {
    let h = Harness::new();

    let (status, body) = h.send(Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");

    h.call(ALICE, "getOrCreateUser", json!({})).await;
    h.call(ALICE, "bindPartner", json!({ "partnerCode": "ZZZZZZ" })).await;

    let (status, body) = h.send(Request::get("/metrics").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains(r#"pairpoints_operations_total{operation="getOrCreateUser",outcome="Ok"} 1"#), "{text}");
    assert!(text.contains(r#"pairpoints_operations_total{operation="bindPartner",outcome="Rejected"} 1"#), "{text}");
}

#[tokio::test]
async fn blob_upload_and_resolve() {
    let h = Harness::new();
    let png = b"\x89PNG\r\n\x1a\nnot really an image".to_vec();

    let req = Request::post("/api/blobs")
        .header(AUTHORIZATION, h.bearer(ALICE))
        .header(CONTENT_TYPE, "image/png")
        .body(Body::from(png))
        .unwrap();
    let (status, body) = h.send(req).await;
    assert_eq!(status, StatusCode::OK);
    let uploaded: Value = serde_json::from_slice(&body).unwrap();
    let id = uploaded["id"].as_str().unwrap().to_string();
    assert!(id.ends_with(".png"));
    assert!(uploaded["url"].as_str().unwrap().starts_with("/static/blobs/"));

    let req = Request::get(format!("/api/blobs/{id}")).header(AUTHORIZATION, h.bearer(BOB)).body(Body::empty()).unwrap();
    let (status, body) = h.send(req).await;
    assert_eq!(status, StatusCode::OK);
    let resolved: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(resolved["url"], uploaded["url"]);

    let req = Request::post("/api/blobs")
        .header(AUTHORIZATION, h.bearer(ALICE))
        .header(CONTENT_TYPE, "text/plain")
        .body(Body::from("hello"))
        .unwrap();
    let (status, _) = h.send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
