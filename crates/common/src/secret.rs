//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports from the [`secrecy`] crate. Use these for every sensitive
//! value the service handles: the Redis connection URL (which may embed a
//! password) and the media engine API key.
//!
//! `SecretString` implements `Debug` with redaction, so any struct that
//! derives `Debug` while holding one cannot leak the value through `{:?}`
//! or tracing fields. Accessing the real value requires an explicit
//! `expose_secret()` call, which keeps every use greppable.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct EngineCredentials {
//!     endpoint: String,
//!     api_key: SecretString,
//! }
//!
//! let creds = EngineCredentials {
//!     endpoint: "https://engine.internal:7880".to_string(),
//!     api_key: SecretString::from("sk-very-secret"),
//! };
//!
//! let debug = format!("{creds:?}");
//! assert!(!debug.contains("sk-very-secret"));
//! assert_eq!(creds.api_key.expose_secret(), "sk-very-secret");
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("redis://:hunter2@localhost:6379");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("hunter2"));
    }

    #[test]
    fn test_expose_secret_returns_inner_value() {
        let secret = SecretString::from("api-key-123");
        assert_eq!(secret.expose_secret(), "api-key-123");
    }

    #[test]
    fn test_deserialize_keeps_redaction() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct Credentials {
            endpoint: String,
            api_key: SecretString,
        }

        let json = r#"{"endpoint": "https://engine:7880", "api_key": "sk-secret"}"#;
        let creds: Credentials = serde_json::from_str(json).expect("deserialize");

        assert_eq!(creds.api_key.expose_secret(), "sk-secret");

        let debug = format!("{creds:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_clone_works() {
        let secret = SecretString::from("cloneable");
        let cloned = secret.clone();
        assert_eq!(cloned.expose_secret(), "cloneable");
    }
}
