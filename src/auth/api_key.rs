//! Legacy admin API key validation
//!
//! Older admin tooling sends a static `x-api-key` header. The key grants
//! admin-level access when it matches the configured value; JWT sessions
//! are the primary mechanism and this shim exists only until those
//! clients migrate.

/// Validates the static admin API key header
#[derive(Clone)]
pub struct ApiKeyValidator {
    key: Option<String>,
}

impl ApiKeyValidator {
    pub fn new(key: Option<String>) -> Self {
        // An empty configured key would accept empty headers
        let key = key.filter(|k| !k.is_empty());
        Self { key }
    }

    /// Disabled validator: no header ever matches
    pub fn disabled() -> Self {
        Self { key: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.key.is_some()
    }

    /// Check a presented `x-api-key` header value
    pub fn validate(&self, presented: Option<&str>) -> bool {
        match (&self.key, presented) {
            (Some(key), Some(presented)) => constant_time_eq(key.as_bytes(), presented.as_bytes()),
            _ => false,
        }
    }
}

/// Byte comparison that does not short-circuit on the first mismatch
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_key_accepted() {
        let validator = ApiKeyValidator::new(Some("secret-key".to_string()));
        assert!(validator.is_enabled());
        assert!(validator.validate(Some("secret-key")));
        assert!(!validator.validate(Some("wrong-key")));
        assert!(!validator.validate(None));
    }

    #[test]
    fn test_disabled_rejects_everything() {
        let validator = ApiKeyValidator::disabled();
        assert!(!validator.is_enabled());
        assert!(!validator.validate(Some("anything")));
        assert!(!validator.validate(Some("")));
    }

    #[test]
    fn test_empty_configured_key_is_disabled() {
        let validator = ApiKeyValidator::new(Some(String::new()));
        assert!(!validator.is_enabled());
        assert!(!validator.validate(Some("")));
    }
}
