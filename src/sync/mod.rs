//! Read-through / write-through coordination between the remote store and
//! the local cache.
//!
//! Reads never fail: a remote failure degrades to the cached copy. Writes go
//! remote first and are mirrored locally; when the remote is unavailable or
//! errors they land in the cache only, with a timestamp id and (for ownerless
//! content) the session identity of their namespace.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::{keys, read_json, write_json, LocalCacheStore};
use crate::events::{ContentChanged, ContentEvents};
use crate::gateway::{GatewayError, RemoteGateway};
use crate::identity::{IdentityContext, IdentityProvider};
use crate::models::{Comment, EntityKind, Id, Question, Review, ValidationError};
use crate::ownership::{resolve, ContentRef, Decision, OwnedContent, OwnershipContext};
use crate::session::{SessionIdentity, SessionNamespace};

mod comments;
mod migrate;
mod questions;
mod reviews;

pub use migrate::{MigrationReport, MigrationSummary};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("{0} {1} not found")]
    NotFound(&'static str, Id),
    #[error("question {0} is resolved and no longer accepts answers")]
    QuestionResolved(Id),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

pub type SyncResult<T> = Result<T, SyncError>;

pub struct Synchronizer {
    gateway: Arc<dyn RemoteGateway>,
    cache: Arc<dyn LocalCacheStore>,
    sessions: SessionIdentity,
    events: ContentEvents,
    /// Held for every read-modify-write of a cached collection. Never held
    /// across a remote call.
    cache_writes: Mutex<()>,
    review_migration: tokio::sync::Mutex<()>,
    question_migration: tokio::sync::Mutex<()>,
    last_local_id: AtomicI64,
}

impl Synchronizer {
    pub fn new(gateway: Arc<dyn RemoteGateway>, cache: Arc<dyn LocalCacheStore>, events: ContentEvents) -> Self {
        let sessions = SessionIdentity::new(cache.clone());
        Self {
            gateway,
            cache,
            sessions,
            events,
            cache_writes: Mutex::new(()),
            review_migration: tokio::sync::Mutex::new(()),
            question_migration: tokio::sync::Mutex::new(()),
            last_local_id: AtomicI64::new(0),
        }
    }

    pub fn events(&self) -> &ContentEvents {
        &self.events
    }

    pub fn sessions(&self) -> &SessionIdentity {
        &self.sessions
    }

    pub fn cache(&self) -> &dyn LocalCacheStore {
        self.cache.as_ref()
    }

    /// The gateway, if its configuration says it can be used at all.
    fn remote(&self) -> Option<&dyn RemoteGateway> {
        if self.gateway.is_available() {
            Some(self.gateway.as_ref())
        } else {
            None
        }
    }

    fn cached<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        read_json(self.cache.as_ref(), key).unwrap_or_default()
    }

    /// Replaces a whole cached collection, e.g. with a fresh remote listing.
    fn store<T: Serialize>(&self, key: &str, items: &[T]) {
        let _guard = self.cache_writes.lock().unwrap_or_else(PoisonError::into_inner);
        write_json(self.cache.as_ref(), key, items);
    }

    /// Reads the cached collection under `key`, applies `f` and writes it back,
    /// with no other cache write in between.
    fn modify_cached<T, R>(&self, key: &str, f: impl FnOnce(&mut Vec<T>) -> R) -> R
    where
        T: Serialize + DeserializeOwned,
    {
        let _guard = self.cache_writes.lock().unwrap_or_else(PoisonError::into_inner);
        let mut items: Vec<T> = read_json(self.cache.as_ref(), key).unwrap_or_default();
        let out = f(&mut items);
        write_json(self.cache.as_ref(), key, &items);
        out
    }

    /// Millisecond timestamp used as the id of records created offline, bumped
    /// past the previous one so ids keep increasing for this synchronizer.
    /// Other installations can still mint the same value.
    fn local_id(&self) -> Id {
        let now = Utc::now().timestamp_millis();
        match self.last_local_id.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |last| Some(now.max(last + 1))) {
            Ok(prev) | Err(prev) => now.max(prev + 1),
        }
    }

    fn emit(&self, event: ContentChanged) {
        self.events.emit(event);
    }

    /// Session token to stamp on ownerless content; `None` for owned content
    /// or when no identity could be persisted.
    fn stamp_for(&self, owner: Option<&str>, namespace: SessionNamespace) -> Option<String> {
        if owner.is_some() {
            return None;
        }
        Some(self.sessions.get_or_create(namespace)).filter(|s| !s.is_empty())
    }

    /// Announces reviews and questions again whenever the provider's user
    /// changes, so subscribers recompute what the new identity may modify.
    /// The task ends once the provider is gone.
    pub fn follow_identity(&self, provider: &dyn IdentityProvider) -> tokio::task::JoinHandle<()> {
        let mut rx = provider.subscribe();
        let events = self.events.clone();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let user = rx.borrow_and_update().as_ref().map(|u| u.id.clone());
                tracing::debug!(user = user.as_deref().unwrap_or(""), "identity changed");
                events.emit(ContentChanged::Reviews);
                events.emit(ContentChanged::Questions);
            }
        })
    }

    /// Advisory edit/delete check for `item` on behalf of `ctx`.
    pub fn can_modify(&self, item: &dyn OwnedContent, ctx: &IdentityContext) -> Decision {
        resolve(item, &CacheEvidence { sync: self, ctx })
    }
}

fn log_fallback(entity: EntityKind, op: &'static str, err: &GatewayError) {
    if matches!(err, GatewayError::Unconfigured) {
        tracing::debug!(entity = entity.as_str(), op, "remote store not configured; using local cache");
        return;
    }
    match err.rejection() {
        Some(r) => tracing::warn!(
            entity = entity.as_str(),
            op,
            status = r.status,
            reason = %r.message,
            code = r.code.as_deref().unwrap_or(""),
            hint = r.hint.as_deref().unwrap_or(""),
            details = r.details.as_deref().unwrap_or(""),
            "remote call rejected; falling back to local cache"
        ),
        None => tracing::warn!(entity = entity.as_str(), op, error = %err, "remote call failed; falling back to local cache"),
    }
    metrics::counter!("ryugaku_remote_fallback_total", "entity" => entity.as_str(), "op" => op).increment(1);
}

/// Remote delete outcome after the local copy is already gone.
fn log_remote_delete(entity: EntityKind, id: Id, result: Result<(), GatewayError>) {
    match result {
        Ok(()) => tracing::debug!(entity = entity.as_str(), id, "deleted remotely"),
        Err(e) if e.is_permission_denied() => {
            tracing::warn!(
                entity = entity.as_str(),
                id,
                error = %e,
                "remote store denied delete; removed from local cache only and may reappear on next sync"
            );
            metrics::counter!("ryugaku_remote_delete_denied_total", "entity" => entity.as_str()).increment(1);
        }
        Err(e) => log_fallback(entity, "delete", &e),
    }
}

struct CacheEvidence<'a> {
    sync: &'a Synchronizer,
    ctx: &'a IdentityContext,
}

impl OwnershipContext for CacheEvidence<'_> {
    fn authenticated_user_id(&self) -> Option<&str> {
        self.ctx.user_id()
    }

    fn session_id(&self, namespace: SessionNamespace) -> String {
        self.sync.sessions.current(namespace)
    }

    fn is_locally_cached(&self, item: ContentRef) -> bool {
        match item {
            ContentRef::Review(id) => self.sync.cached::<Review>(keys::REVIEWS).iter().any(|r| r.id == id),
            ContentRef::Comment { review_id, id } => self
                .sync
                .cached::<Comment>(&keys::review_comments(review_id))
                .iter()
                .any(|c| c.id == id),
            ContentRef::Question(id) => self.sync.cached::<Question>(keys::QUESTIONS).iter().any(|q| q.id == id),
            ContentRef::Answer(id) => self
                .sync
                .cached::<Question>(keys::QUESTIONS)
                .iter()
                .any(|q| q.answers.iter().any(|a| a.id == id)),
        }
    }
}
