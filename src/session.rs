//! Per-installation pseudo identities for anonymous content.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use rand::Rng;
use serde::Serialize;

use crate::cache::LocalCacheStore;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Content types with their own session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionNamespace {
    Comments,
    Questions,
    Answers,
}

impl SessionNamespace {
    pub fn storage_key(self) -> &'static str {
        match self {
            SessionNamespace::Comments => "comment_session_id",
            SessionNamespace::Questions => "question_session_id",
            SessionNamespace::Answers => "answer_session_id",
        }
    }
}

/// `session_<millis>_<13 base36 chars>`
pub fn mint_session_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..13)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("session_{}_{}", Utc::now().timestamp_millis(), suffix)
}

#[derive(Clone)]
pub struct SessionIdentity {
    cache: Arc<dyn LocalCacheStore>,
    minting: Arc<Mutex<()>>,
}

impl SessionIdentity {
    pub fn new(cache: Arc<dyn LocalCacheStore>) -> Self {
        Self { cache, minting: Arc::new(Mutex::new(())) }
    }

    /// Returns the stored token, minting and persisting one on first use.
    /// An empty string means no identity could be established.
    pub fn get_or_create(&self, namespace: SessionNamespace) -> String {
        let key = namespace.storage_key();
        let _guard = self.minting.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = self.cache.get(key).filter(|s| !s.is_empty()) {
            return existing;
        }
        let minted = mint_session_id();
        self.cache.set(key, &minted);
        // the store swallows write failures, so confirm the token stuck
        match self.cache.get(key) {
            Some(stored) if stored == minted => minted,
            _ => {
                tracing::warn!(namespace = key, "session identity could not be persisted");
                String::new()
            }
        }
    }

    /// Current token without minting; empty when none exists.
    pub fn current(&self, namespace: SessionNamespace) -> String {
        self.cache.get(namespace.storage_key()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;

    struct ReadOnlyStore;
    impl LocalCacheStore for ReadOnlyStore {
        fn get(&self, _key: &str) -> Option<String> { None }
        fn set(&self, _key: &str, _value: &str) {}
        fn remove(&self, _key: &str) {}
    }

    #[test]
    fn minted_format() {
        let id = mint_session_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "session");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 13);
        assert!(parts[2].bytes().all(|b| BASE36.contains(&b)));
    }

    #[test]
    fn get_or_create_is_idempotent_per_namespace() {
        let sessions = SessionIdentity::new(Arc::new(MemoryCacheStore::new()));
        assert_eq!(sessions.current(SessionNamespace::Comments), "");
        let a = sessions.get_or_create(SessionNamespace::Comments);
        let b = sessions.get_or_create(SessionNamespace::Comments);
        assert!(!a.is_empty());
        assert_eq!(a, b);
        assert_eq!(sessions.current(SessionNamespace::Comments), a);
        assert_eq!(sessions.current(SessionNamespace::Questions), "");
    }

    #[test]
    fn unwritable_store_yields_empty_identity() {
        let sessions = SessionIdentity::new(Arc::new(ReadOnlyStore));
        assert_eq!(sessions.get_or_create(SessionNamespace::Answers), "");
    }

    #[test]
    fn concurrent_first_use_agrees_on_one_token() {
        let sessions = SessionIdentity::new(Arc::new(MemoryCacheStore::new()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sessions = sessions.clone();
                std::thread::spawn(move || sessions.get_or_create(SessionNamespace::Questions))
            })
            .collect();
        let tokens: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(!tokens[0].is_empty());
        assert!(tokens.iter().all(|t| *t == tokens[0]));
    }
}
