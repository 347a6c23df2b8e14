//! Session lifecycle
//!
//! `Session` is the composition root: it owns the database pool, wires the
//! services together, and reacts to identity changes. Embedders construct
//! one per data directory and remote rather than going through a global.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::DB_FILE_NAME;
use crate::database::{create_pool, ItemRepository};
use crate::error::Result;
use crate::identity::IdentityProvider;
use crate::remote::RemoteStore;
use crate::services::{ItemsService, SyncHandle, SyncService};

/// Everything a session needs from its embedder
pub struct SessionConfig {
    /// Directory holding this session's database
    pub data_dir: PathBuf,
    /// Cloud mirror to reconcile against
    pub remote: Arc<dyn RemoteStore>,
    /// Source of the signed-in user
    pub identity: Arc<dyn IdentityProvider>,
}

/// A running inventory session.
///
/// Item operations work regardless of authentication state; cloud sync
/// runs only while the identity provider reports a signed-in user.
pub struct Session {
    pool: sqlx::SqlitePool,
    items: ItemsService,
    sync: SyncService,
    active_sync: Arc<Mutex<Option<SyncHandle>>>,
    identity_task: JoinHandle<()>,
}

impl Session {
    /// Open the local store and start watching the identity provider
    pub async fn start(config: SessionConfig) -> Result<Session> {
        tracing::info!("Starting session (data dir: {:?})", config.data_dir);

        std::fs::create_dir_all(&config.data_dir)?;

        let pool = create_pool(&config.data_dir.join(DB_FILE_NAME)).await?;
        let repo = ItemRepository::new(pool.clone());

        let sync = SyncService::new(repo.clone(), config.remote);
        let items = ItemsService::new(repo, sync.outbox_wakeup());

        let active_sync = Arc::new(Mutex::new(None));
        let identity_task = tokio::spawn(watch_identity(
            sync.clone(),
            config.identity,
            active_sync.clone(),
        ));

        tracing::info!("Session started successfully");

        Ok(Session {
            pool,
            items,
            sync,
            active_sync,
            identity_task,
        })
    }

    /// Item operations for this session
    pub fn items(&self) -> &ItemsService {
        &self.items
    }

    /// Sync operations for this session (explicit flushes, mainly)
    pub fn sync(&self) -> &SyncService {
        &self.sync
    }

    /// Stop sync, release the identity watcher, and close the database.
    /// Queued pushes survive in the outbox for the next session.
    pub async fn shutdown(self) {
        tracing::info!("Shutting down session");

        self.identity_task.abort();

        if let Some(handle) = self.active_sync.lock().await.take() {
            handle.cancel();
        }

        self.pool.close().await;

        tracing::info!("Session shut down");
    }
}

/// React to identity changes: start sync on sign-in, stop it on sign-out.
/// Ends when the identity provider is dropped.
async fn watch_identity(
    sync: SyncService,
    identity: Arc<dyn IdentityProvider>,
    active_sync: Arc<Mutex<Option<SyncHandle>>>,
) {
    let mut rx = identity.watch();

    loop {
        let user = rx.borrow_and_update().clone();

        {
            let mut slot = active_sync.lock().await;

            if let Some(previous) = slot.take() {
                tracing::info!("Stopping cloud sync");
                previous.cancel();
            }

            match &user {
                Some(user_id) => *slot = Some(sync.start(user_id)),
                None => tracing::warn!("Cloud sync disabled: no user is signed in"),
            }
        }

        if rx.changed().await.is_err() {
            break;
        }
    }
}
