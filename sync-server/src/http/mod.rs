//! HTTP endpoints for sync-server.
//!
//! Provides the health check and the `notes` resource.

pub mod health;
pub mod notes;
pub mod params;

use crate::error::{ServerError, StorageError};
use crate::notes::Note;
use crate::server::SyncServer;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde_json::json;
use std::sync::Arc;
use sync_core::{Action, CollectionError, ComposeError, Outcome, ResponsePayload, ResponseStrategy, Status};
use sync_types::SyncError;

pub use health::HealthStatus;

/// Build the HTTP router with all endpoints.
pub fn build_router(server: Arc<SyncServer>) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/notes", get(notes::index).post(notes::create))
        .route(
            "/notes/:id",
            get(notes::show).put(notes::update).delete(notes::destroy),
        )
        .layer(Extension(server))
}

/// Request failures that bypass the response strategy.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No record with this id.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Anything else. Logged, and answered with a generic 500.
    #[error(transparent)]
    Server(#[from] ServerError),
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        Self::Server(err.into())
    }
}

impl From<CollectionError> for ApiError {
    fn from(err: CollectionError) -> Self {
        Self::Server(ComposeError::from(err).into())
    }
}

impl From<ComposeError> for ApiError {
    fn from(err: ComposeError) -> Self {
        Self::Server(err.into())
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        Self::Server(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound(id) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "errors": { "id": [format!("no record with id {id}")] } })),
            )
                .into_response(),
            Self::Server(err) => {
                tracing::error!(error = %err, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal error" })),
                )
                    .into_response()
            }
        }
    }
}

/// Run the response strategy and convert its result for axum.
pub(crate) fn render(
    responder: &dyn ResponseStrategy<Note>,
    action: Action,
    outcome: Outcome<ResponsePayload<Note>>,
) -> Result<Response, ApiError> {
    let rendered = responder.render(action, outcome)?;
    let status = match rendered.status {
        Status::Ok => StatusCode::OK,
        Status::Created => StatusCode::CREATED,
        Status::UnprocessableEntity => StatusCode::UNPROCESSABLE_ENTITY,
    };
    Ok((status, Json(rendered.body)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::notes::NoteDraft;
    use crate::storage::SqliteStorage;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::{DateTime, Duration, Utc};
    use serde_json::Value;
    use std::collections::BTreeMap;
    use sync_core::{CodecKind, Rendered};
    use sync_types::{RecordId, SyncedAt};
    use tower::util::ServiceExt;

    fn current_time() -> DateTime<Utc> {
        let ahead = Utc::now() + Duration::days(1);
        DateTime::from_timestamp_millis(ahead.timestamp_millis()).unwrap()
    }

    fn draft(title: &str) -> NoteDraft {
        NoteDraft {
            title: title.to_string(),
            body: String::new(),
            status: "open".to_string(),
            tags: Vec::new(),
        }
    }

    /// 20 notes in 4 hourly batches of 5, the newest batch at `now`.
    async fn seeded_storage(now: DateTime<Utc>) -> SqliteStorage {
        let storage = SqliteStorage::in_memory().await.unwrap();
        for batch in 0..4i64 {
            let at = now - Duration::hours(3 - batch);
            for n in 0..5 {
                let status = if n == 0 { "done" } else { "open" };
                let mut draft = draft(&format!("note {}", batch * 5 + n + 1));
                draft.status = status.to_string();
                storage.insert_note_at(draft, at).await.unwrap();
            }
        }
        storage
    }

    async fn test_server(codec: CodecKind) -> (Arc<SyncServer>, DateTime<Utc>) {
        let now = current_time();
        let mut config = Config::default();
        config.sync.codec = codec;
        let server = SyncServer::new(config, seeded_storage(now).await).unwrap();
        (Arc::new(server), now)
    }

    async fn call(server: &Arc<SyncServer>, request: Request<Body>) -> (StatusCode, Value) {
        let response = build_router(server.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn get(server: &Arc<SyncServer>, uri: &str) -> (StatusCode, Value) {
        call(server, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
    }

    async fn send_json(
        server: &Arc<SyncServer>,
        method: &str,
        uri: &str,
        body: Value,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        call(server, request).await
    }

    fn token(server: &SyncServer, entries: impl IntoIterator<Item = (i64, DateTime<Utc>)>) -> String {
        let clock = server.settings().clock();
        let map: BTreeMap<RecordId, SyncedAt> = entries
            .into_iter()
            .map(|(id, at)| (RecordId::Int(id), clock.to_synced_at(at)))
            .collect();
        server.settings().encode_token(&map)
    }

    fn escape(raw: &str) -> String {
        raw.bytes()
            .map(|b| {
                if b.is_ascii_alphanumeric() {
                    (b as char).to_string()
                } else {
                    format!("%{b:02X}")
                }
            })
            .collect()
    }

    fn object_ids(json: &Value) -> Vec<i64> {
        json["objects"]
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o["id"].as_i64().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let (server, _) = test_server(CodecKind::Json).await;
        let (status, json) = get(&server, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["notes"], 20);
    }

    #[tokio::test]
    async fn index_without_token_lists_under_plural_key() {
        let (server, _) = test_server(CodecKind::Json).await;
        let (status, json) = get(&server, "/notes").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["notes"].as_array().unwrap().len(), 20);
        assert!(json.get("total").is_none());
        assert!(json.get("objects").is_none());
    }

    #[tokio::test]
    async fn index_with_future_token_skips_synced_notes() {
        let (server, now) = test_server(CodecKind::UrlSafe).await;
        let s = token(&server, (11..=15).map(|id| (id, now + Duration::hours(10))));

        let (status, json) = get(&server, &format!("/notes?start=10&length=10&s={s}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total"], 20);
        let indices = json["indices"].as_object().unwrap();
        assert_eq!(indices.len(), 10);
        assert_eq!(indices["10"], 11);
        assert_eq!(indices["19"], 20);
        assert_eq!(object_ids(&json), (16..=20).collect::<Vec<_>>());
        assert!(json["requested_at"].is_i64());
    }

    #[tokio::test]
    async fn index_with_json_token_resends_stale_notes() {
        let (server, now) = test_server(CodecKind::Json).await;
        // Pairs (11,12), (13,14), ... synced at now, now-1h, ...
        let entries = (0..5i64).flat_map(|i| {
            (0..2i64).map(move |j| (i * 2 + j + 11, now - Duration::hours(i)))
        });
        let s = escape(&token(&server, entries));

        let (_, json) = get(&server, &format!("/notes?start=10&length=10&s={s}")).await;
        assert_eq!(json["total"], 20);
        assert_eq!(object_ids(&json), (15..=20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn malformed_and_empty_tokens() {
        let (server, _) = test_server(CodecKind::Json).await;

        let (_, json) = get(&server, "/notes?start=10&length=10&s=omgwtfbbq").await;
        assert_eq!(object_ids(&json), (11..=20).collect::<Vec<_>>());

        let (_, json) = get(&server, "/notes?start=0&length=5&s=").await;
        assert_eq!(json["total"], 20);
        assert_eq!(json["indices"].as_object().unwrap().len(), 5);
        assert_eq!(object_ids(&json), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn bracket_filter_narrows_total() {
        let (server, _) = test_server(CodecKind::Json).await;
        let (_, json) = get(&server, "/notes?s=&filter%5Bstatus%5D=done").await;
        assert_eq!(json["total"], 4);
        assert_eq!(object_ids(&json), vec![1, 6, 11, 16]);
    }

    #[tokio::test]
    async fn allow_listed_order_is_honoured() {
        let (server, _) = test_server(CodecKind::Json).await;
        let (_, json) = get(&server, "/notes?order_by=id&direction=desc&s=&length=3").await;
        assert_eq!(object_ids(&json), vec![20, 19, 18]);

        // Not in the allow-list, so the default (primary key) order applies.
        let (_, json) = get(&server, "/notes?order_by=body&s=&length=3").await;
        assert_eq!(object_ids(&json), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn additional_data_is_opt_in() {
        let (server, now) = test_server(CodecKind::Json).await;
        let (_, json) = get(&server, "/notes?s=&length=5").await;
        assert!(json.get("count").is_none());

        let (_, json) = get(&server, "/notes?s=&start=15&length=5&additional_data=true").await;
        assert_eq!(json["count"], 5);
        let latest = server.settings().clock().to_synced_at(now).value();
        assert_eq!(json["latest_synced_at"], latest);
    }

    #[tokio::test]
    async fn large_token_still_answers() {
        let (server, now) = test_server(CodecKind::UrlSafe).await;
        let s = token(&server, (1..=1100).map(|id| (id, now + Duration::hours(10))));

        let (status, json) = get(&server, &format!("/notes?start=0&length=5&s={s}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total"], 20);
        assert_eq!(json["indices"].as_object().unwrap().len(), 5);
        assert!(object_ids(&json).is_empty());
    }

    #[tokio::test]
    async fn ranged_body_keeps_key_order() {
        let (server, _) = test_server(CodecKind::Json).await;
        let request = Request::builder()
            .uri("/notes?s=&length=2&additional_data=true")
            .body(Body::empty())
            .unwrap();
        let response = build_router(server.clone()).oneshot(request).await.unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = String::from_utf8(bytes.to_vec()).unwrap();

        let positions: Vec<usize> = [
            "\"requested_at\"",
            "\"total\"",
            "\"indices\"",
            "\"objects\"",
            "\"latest_synced_at\"",
            "\"count\"",
        ]
        .iter()
        .map(|key| body.find(key).unwrap())
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{body}");
    }

    #[tokio::test]
    async fn show_and_missing() {
        let (server, _) = test_server(CodecKind::Json).await;
        let (status, json) = get(&server, "/notes/3").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["note"]["title"], "note 3");

        let (status, json) = get(&server, "/notes/999").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["errors"]["id"].is_array());

        let (status, _) = get(&server, "/notes/abc").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_validates_and_returns_201() {
        let (server, _) = test_server(CodecKind::Json).await;
        let (status, json) = send_json(
            &server,
            "POST",
            "/notes",
            json!({ "note": { "title": "fresh", "tags": ["a", "a", " b "] } }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["note"]["id"], 21);
        assert_eq!(json["note"]["status"], "open");
        assert_eq!(json["note"]["tags"], json!(["a", "b"]));

        let (status, json) =
            send_json(&server, "POST", "/notes", json!({ "note": { "title": "  " } })).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json, json!({ "errors": { "title": ["can't be blank"] } }));
    }

    #[tokio::test]
    async fn update_reloads_and_resyncs() {
        let (server, now) = test_server(CodecKind::UrlSafe).await;
        let (status, json) = send_json(
            &server,
            "PUT",
            "/notes/2",
            json!({ "note": { "body": "edited" } }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["note"]["title"], "note 2");
        assert_eq!(json["note"]["body"], "edited");

        // Notes 1..=5 were written at now-3h; a client that synced them
        // then gets only the edited one again.
        let synced = now - Duration::hours(3);
        let s = token(&server, (1..=5).map(|id| (id, synced)));
        let (_, json) = get(&server, &format!("/notes?start=0&length=5&s={s}")).await;
        assert_eq!(object_ids(&json), vec![2]);

        let (status, _) =
            send_json(&server, "PUT", "/notes/77", json!({ "note": { "title": "x" } })).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, json) =
            send_json(&server, "PUT", "/notes/2", json!({ "note": { "title": "" } })).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(json["errors"]["title"].is_array());
    }

    #[tokio::test]
    async fn destroy_renders_empty_object() {
        let (server, _) = test_server(CodecKind::Json).await;
        let request = Request::builder()
            .method("DELETE")
            .uri("/notes/4")
            .body(Body::empty())
            .unwrap();
        let (status, json) = call(&server, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, json!({}));

        let (status, _) = get(&server, "/notes/4").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn custom_responder_replaces_rendering() {
        struct Enveloped;

        impl ResponseStrategy<Note> for Enveloped {
            fn render(
                &self,
                _action: Action,
                outcome: Outcome<ResponsePayload<Note>>,
            ) -> Result<Rendered, SyncError> {
                let body = match outcome {
                    Outcome::Success(payload) => json!({
                        "data": serde_json::to_value(&payload).map_err(SyncError::Serialization)?
                    }),
                    Outcome::Failure(errors) => json!({ "problems": errors }),
                };
                Ok(Rendered {
                    status: Status::Ok,
                    body,
                })
            }
        }

        let server = SyncServer::new(Config::default(), seeded_storage(current_time()).await)
            .unwrap()
            .with_responder(Arc::new(Enveloped));
        let server = Arc::new(server);

        let (status, json) = get(&server, "/notes/1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["note"]["id"], 1);

        let (status, json) =
            send_json(&server, "POST", "/notes", json!({ "note": { "title": "" } })).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["problems"]["title"].is_array());
    }
}
