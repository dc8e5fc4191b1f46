//! Main SyncServer coordination.
//!
//! SyncServer owns the storage, the process-wide sync settings and the
//! per-resource composer, and serves the HTTP router.

use crate::config::Config;
use crate::error::ServerError;
use crate::http::build_router;
use crate::notes::{Note, NotesSummary};
use crate::storage::SqliteStorage;
use std::collections::BTreeMap;
use std::sync::Arc;
use sync_core::{Composer, DefaultResponder, ResponseStrategy, SyncSettings, ViewConfig, ViewState};
use sync_types::ParamValue;

/// Main sync server.
pub struct SyncServer {
    config: Config,
    storage: Arc<SqliteStorage>,
    settings: Arc<SyncSettings>,
    note_views: Arc<ViewConfig>,
    composer: Composer<Note>,
    responder: Arc<dyn ResponseStrategy<Note>>,
}

impl std::fmt::Debug for SyncServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncServer")
            .field("config", &self.config)
            .field("storage", &self.storage)
            .field("composer", &self.composer)
            .finish_non_exhaustive()
    }
}

impl SyncServer {
    /// Create a new SyncServer with the given config and storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the config fails validation.
    pub fn new(config: Config, storage: SqliteStorage) -> Result<Self, ServerError> {
        config.validate()?;

        let settings = Arc::new(config.sync.settings());
        let composer = Composer::new(Note::descriptor(), settings.clone())
            .with_additional_data(Arc::new(NotesSummary::new(*settings.clock())));

        Ok(Self {
            note_views: Arc::new(config.views.notes.clone()),
            config,
            storage: Arc::new(storage),
            settings,
            composer,
            responder: Arc::new(DefaultResponder),
        })
    }

    /// Replace the response strategy used by every note endpoint.
    pub fn with_responder(mut self, responder: Arc<dyn ResponseStrategy<Note>>) -> Self {
        self.responder = responder;
        self
    }

    /// The configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The note storage.
    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    /// The process-wide sync settings.
    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// The note composer.
    pub fn composer(&self) -> &Composer<Note> {
        &self.composer
    }

    /// The note response strategy.
    pub fn responder(&self) -> &dyn ResponseStrategy<Note> {
        self.responder.as_ref()
    }

    /// Resolve a note view from request parameters.
    pub fn note_view(&self, params: BTreeMap<String, ParamValue>) -> ViewState {
        ViewState::build(params, self.note_views.clone())
    }

    /// Bind and serve until the listener fails.
    pub async fn run(self: Arc<Self>) -> Result<(), ServerError> {
        let listener = tokio::net::TcpListener::bind(&self.config.server.bind_address).await?;
        tracing::info!(
            address = %self.config.server.bind_address,
            codec = self.settings.codec().name(),
            base_time = self.settings.clock().base_time(),
            "sync-server listening"
        );
        axum::serve(listener, build_router(self)).await?;
        Ok(())
    }
}
