//! Cache key and namespace derivation.

use sha2::{Digest, Sha256};

use super::config::{CacheConfig, NamespaceMode};

/// Maps a request identity to the namespace its response is written into.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NamespaceStrategy {
    /// Every URL gets its own namespace, named after the URL.
    #[default]
    PerUrl,
    /// All URLs share the named namespace.
    Shared(String),
}

impl NamespaceStrategy {
    pub fn namespace_for(&self, key: &str) -> String {
        match self {
            Self::PerUrl => key.to_string(),
            Self::Shared(name) => name.clone(),
        }
    }
}

impl From<&CacheConfig> for NamespaceStrategy {
    fn from(config: &CacheConfig) -> Self {
        match config.namespace_mode {
            NamespaceMode::PerUrl => Self::PerUrl,
            NamespaceMode::Shared => Self::Shared(config.shared_namespace.clone()),
        }
    }
}

/// Filesystem-safe digest of a namespace name or entry key.
pub fn storage_digest(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_url_namespace_is_the_key() {
        let strategy = NamespaceStrategy::PerUrl;
        assert_eq!(
            strategy.namespace_for("http://localhost/a.json"),
            "http://localhost/a.json"
        );
    }

    #[test]
    fn shared_namespace_ignores_the_key() {
        let strategy = NamespaceStrategy::Shared("v1".to_string());
        assert_eq!(strategy.namespace_for("http://localhost/a.json"), "v1");
        assert_eq!(strategy.namespace_for("http://localhost/b.json"), "v1");
    }

    #[test]
    fn strategy_follows_config() {
        let config = CacheConfig {
            namespace_mode: NamespaceMode::Shared,
            shared_namespace: "posts".to_string(),
            ..Default::default()
        };
        assert_eq!(
            NamespaceStrategy::from(&config),
            NamespaceStrategy::Shared("posts".to_string())
        );
        assert_eq!(
            NamespaceStrategy::from(&CacheConfig::default()),
            NamespaceStrategy::PerUrl
        );
    }

    #[test]
    fn digest_is_stable_hex() {
        let first = storage_digest("http://localhost/a.json");
        let second = storage_digest("http://localhost/a.json");
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(first, storage_digest("http://localhost/b.json"));
    }
}
