use dashmap::DashMap;
use std::env;
use std::str::FromStr;
use std::sync::Arc;

/// Key holding the maximum buffered request body size, in bytes.
pub const BODY_LIMIT: &str = "request.body_limit";

/// Configuration service, bound once in the root injector.
///
/// Keys are dotted lowercase names (`request.body_limit`). When loaded from
/// the environment, `STRATA_REQUEST__BODY_LIMIT` maps to `request.body_limit`.
#[derive(Clone, Default, Debug)]
pub struct ConfigService {
    config: Arc<DashMap<String, String>>,
}

impl ConfigService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every variable starting with `prefix`.
    pub fn from_env(prefix: &str) -> Self {
        let service = Self::default();
        for (key, value) in env::vars() {
            if let Some(name) = key.strip_prefix(prefix) {
                service.set(&Self::normalize(name), &value);
            }
        }
        service
    }

    fn normalize(name: &str) -> String {
        name.trim_start_matches('_')
            .to_lowercase()
            .replace("__", ".")
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.config.get(key).map(|v| v.clone())
    }

    /// Parsed value; `None` when missing or unparsable.
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    pub fn set(&self, key: &str, value: &str) {
        self.config.insert(key.to_string(), value.to_string());
    }

    pub fn with(self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    pub fn body_limit(&self) -> Option<usize> {
        self.get_parsed(BODY_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_names_are_normalized() {
        assert_eq!(ConfigService::normalize("_REQUEST__BODY_LIMIT"), "request.body_limit");
    }

    #[test]
    fn test_typed_lookup() {
        let config = ConfigService::new().with(BODY_LIMIT, " 1024 ");
        assert_eq!(config.body_limit(), Some(1024));

        config.set(BODY_LIMIT, "lots");
        assert_eq!(config.body_limit(), None);
    }
}
