use std::fmt;
use std::path::PathBuf;

/// Placeholder values shipped in `.env.example`; a deployment still carrying
/// them is treated as unconfigured.
const PLACEHOLDER_URL: &str = "https://placeholder.supabase.co";
const PLACEHOLDER_KEY: &str = "placeholder-key";

/// Default cache quota, matching the usual browser local-storage budget.
pub const DEFAULT_CACHE_QUOTA_BYTES: usize = 5 * 1024 * 1024;

/// Endpoint and public key of the remote relational store.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RemoteConfig {
    pub url: String,
    pub anon_key: String,
}

impl RemoteConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self { url: url.into(), anon_key: anon_key.into() }
    }

    pub fn from_env() -> Self {
        fn first_env(names: &[&str]) -> String {
            names
                .iter()
                .find_map(|n| std::env::var(n).ok().filter(|v| !v.trim().is_empty()))
                .unwrap_or_default()
        }
        Self {
            url: first_env(&["SUPABASE_URL", "NEXT_PUBLIC_SUPABASE_URL"]),
            anon_key: first_env(&["SUPABASE_ANON_KEY", "NEXT_PUBLIC_SUPABASE_ANON_KEY"]),
        }
    }

    /// True when both values are present and none of them is a placeholder.
    /// No network I/O happens here.
    pub fn is_available(&self) -> bool {
        let url = self.url.trim();
        let key = self.anon_key.trim();
        !url.is_empty()
            && !key.is_empty()
            && url != PLACEHOLDER_URL
            && key != PLACEHOLDER_KEY
            && !url.contains("placeholder")
            && !key.contains("placeholder")
    }
}

// keep the key out of logs
impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("url", &self.url)
            .field("anon_key", &if self.anon_key.is_empty() { "<unset>" } else { "<redacted>" })
            .finish()
    }
}

/// Process configuration, read once at startup.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub remote: RemoteConfig,
    pub data_dir: PathBuf,
    pub cache_quota_bytes: usize,
    pub bind_addr: String,
    pub frontend_url: String,
    pub jwt_configured: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        fn usize_env(name: &str, default: usize) -> usize {
            std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
        }
        fn string_env(name: &str, default: &str) -> String {
            std::env::var(name).unwrap_or_else(|_| default.to_string())
        }
        Self {
            remote: RemoteConfig::from_env(),
            data_dir: PathBuf::from(string_env("RYUGAKU_DATA_DIR", "data")),
            cache_quota_bytes: usize_env("RYUGAKU_CACHE_QUOTA_BYTES", DEFAULT_CACHE_QUOTA_BYTES),
            bind_addr: string_env("BIND_ADDR", "0.0.0.0:8080"),
            frontend_url: string_env("FRONTEND_URL", "http://localhost:3000"),
            jwt_configured: std::env::var(crate::identity::JWT_SECRET_ENV).is_ok(),
        }
    }

    /// Snapshot file backing the local cache.
    pub fn cache_path(&self) -> PathBuf {
        self.data_dir.join("local_cache.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn availability_requires_both_values() {
        assert!(!RemoteConfig::default().is_available());
        assert!(!RemoteConfig::new("https://abc.supabase.co", "").is_available());
        assert!(!RemoteConfig::new("", "key").is_available());
        assert!(RemoteConfig::new("https://abc.supabase.co", "eyJhbGciOi").is_available());
    }

    #[test]
    fn placeholders_mean_unconfigured() {
        assert!(!RemoteConfig::new(PLACEHOLDER_URL, "real-key").is_available());
        assert!(!RemoteConfig::new("https://abc.supabase.co", PLACEHOLDER_KEY).is_available());
        assert!(!RemoteConfig::new("https://placeholder-project.supabase.co", "k").is_available());
        assert!(!RemoteConfig::new("https://abc.supabase.co", "my-placeholder").is_available());
    }

    #[test]
    fn debug_redacts_key() {
        let cfg = RemoteConfig::new("https://abc.supabase.co", "secret-anon-key");
        let out = format!("{cfg:?}");
        assert!(out.contains("abc.supabase.co"));
        assert!(!out.contains("secret-anon-key"));
    }
}
