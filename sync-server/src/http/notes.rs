//! `/notes` endpoints.
//!
//! `GET /notes` is sync-aware: with an `s` parameter it answers with a
//! ranged payload (`requested_at`, `total`, `indices`, `objects`) holding
//! only the notes of the requested window the client lacks or holds
//! stale. Without `s` it lists every matching note under `notes`.

use super::params::{fold_params, wants_additional_data};
use super::{render, ApiError};
use crate::notes::{Note, NoteEnvelope};
use crate::server::SyncServer;
use crate::storage::NoteStore;
use axum::extract::{Path, Query};
use axum::response::Response;
use axum::{Extension, Json};
use std::collections::BTreeMap;
use std::sync::Arc;
use sync_core::{Action, Collection, ComposeOptions, Outcome, Scope, Subject};
use sync_types::RecordId;

type Pairs = Query<Vec<(String, String)>>;

/// `GET /notes`
pub async fn index(
    Extension(server): Extension<Arc<SyncServer>>,
    Query(pairs): Pairs,
) -> Result<Response, ApiError> {
    let params = fold_params(pairs);
    let additional = wants_additional_data(&params);
    let view = server.note_view(params);

    let scope = Scope::all().view_filter(&view).view_order(&view);
    let options = ComposeOptions::from_view(&view).with_additional_data(additional);
    tracing::debug!(ranged = options.is_ranged(), view = %view.current(), "listing notes");

    let payload = server
        .composer()
        .compose(Subject::relation(server.storage(), scope), &view, &options)
        .await?;
    render(server.responder(), Action::Index, Outcome::Success(payload))
}

/// `GET /notes/:id`
pub async fn show(
    Extension(server): Extension<Arc<SyncServer>>,
    Path(id): Path<String>,
    Query(pairs): Pairs,
) -> Result<Response, ApiError> {
    let params = fold_params(pairs);
    let additional = wants_additional_data(&params);
    let view = server.note_view(params);
    let note = find_note(&server, &id).await?;

    let options = ComposeOptions::default().with_additional_data(additional);
    let payload = server
        .composer()
        .compose(Subject::One(note), &view, &options)
        .await?;
    render(server.responder(), Action::Show, Outcome::Success(payload))
}

/// `POST /notes`
pub async fn create(
    Extension(server): Extension<Arc<SyncServer>>,
    Json(envelope): Json<NoteEnvelope>,
) -> Result<Response, ApiError> {
    let draft = envelope.note.into_draft(None);
    if let Err(errors) = draft.validate() {
        tracing::debug!(?errors, "rejected note");
        return render(server.responder(), Action::Create, Outcome::Failure(errors));
    }

    let note = server.storage().insert_note(draft).await?;
    tracing::info!(id = note.id, "note created");
    respond_with(&server, Action::Create, note).await
}

/// `PUT /notes/:id`
pub async fn update(
    Extension(server): Extension<Arc<SyncServer>>,
    Path(id): Path<String>,
    Json(envelope): Json<NoteEnvelope>,
) -> Result<Response, ApiError> {
    let existing = find_note(&server, &id).await?;
    let draft = envelope.note.into_draft(Some(&existing));
    if let Err(errors) = draft.validate() {
        tracing::debug!(id = existing.id, ?errors, "rejected note update");
        return render(server.responder(), Action::Update, Outcome::Failure(errors));
    }

    let note = server
        .storage()
        .update_note(existing.id, draft)
        .await?
        .ok_or(ApiError::NotFound(id))?;
    tracing::info!(id = note.id, "note updated");
    respond_with(&server, Action::Update, note).await
}

/// `DELETE /notes/:id`
pub async fn destroy(
    Extension(server): Extension<Arc<SyncServer>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let note = find_note(&server, &id).await?;
    if !server.storage().delete_note(note.id).await? {
        return Err(ApiError::NotFound(id));
    }
    tracing::info!(id = note.id, "note deleted");
    respond_with(&server, Action::Destroy, note).await
}

async fn find_note(server: &SyncServer, id: &str) -> Result<Note, ApiError> {
    server
        .storage()
        .find(&RecordId::parse(id))
        .await?
        .ok_or_else(|| ApiError::NotFound(id.to_string()))
}

async fn respond_with(server: &SyncServer, action: Action, note: Note) -> Result<Response, ApiError> {
    let view = server.note_view(BTreeMap::new());
    let payload = server
        .composer()
        .compose(Subject::One(note), &view, &ComposeOptions::default())
        .await?;
    render(server.responder(), action, Outcome::Success(payload))
}
