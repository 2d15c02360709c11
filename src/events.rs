use serde::Serialize;
use tokio::sync::broadcast;
use utoipa::ToSchema;

use crate::models::Id;

/// "Something in this collection changed" signal. Receivers should reload;
/// the payload carries no record data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "entity", rename_all = "camelCase")]
pub enum ContentChanged {
    Reviews,
    #[serde(rename_all = "camelCase")]
    Comments { review_id: Id },
    Questions,
}

/// Injected publish/subscribe bus shared by the synchronizer and its readers.
#[derive(Clone)]
pub struct ContentEvents {
    tx: broadcast::Sender<ContentChanged>,
}

impl ContentEvents {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn emit(&self, event: ContentChanged) {
        // no subscribers is fine
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ContentChanged> {
        self.tx.subscribe()
    }
}

impl Default for ContentEvents {
    fn default() -> Self {
        Self::new(64)
    }
}
