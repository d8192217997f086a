//! Secret types for keeping credentials out of logs.
//!
//! Re-exports the [`secrecy`] types used across the stream controller. The
//! API secret that signs access tokens and the stream keys returned by the
//! media server are both held as [`SecretString`], so deriving `Debug` on a
//! struct that carries one never prints the value.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct IngressEndpoint {
//!     url: String,
//!     stream_key: SecretString,
//! }
//!
//! let endpoint = IngressEndpoint {
//!     url: "rtmp://media.example.com/live".to_string(),
//!     stream_key: SecretString::from("sk_live_abc"),
//! };
//!
//! // Debug output redacts the key
//! assert!(!format!("{endpoint:?}").contains("sk_live_abc"));
//!
//! // Reading the key is always an explicit call
//! assert_eq!(endpoint.stream_key.expose_secret(), "sk_live_abc");
//! ```
//!
//! Only expose a secret at the point it leaves the process: when signing a
//! token, or when the stream key is written into a publisher response.

pub use secrecy::{ExposeSecret, SecretString};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("api-secret-value");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("api-secret-value"));
    }

    #[test]
    fn test_stream_key_in_struct_is_redacted() {
        #[allow(dead_code)]
        #[derive(Debug)]
        struct Endpoint {
            url: String,
            stream_key: SecretString,
        }

        let endpoint = Endpoint {
            url: "rtmp://media.local/live".to_string(),
            stream_key: SecretString::from("sk_0123456789"),
        };

        let debug_str = format!("{endpoint:?}");
        assert!(debug_str.contains("rtmp://media.local/live"));
        assert!(!debug_str.contains("sk_0123456789"));
    }

    #[test]
    fn test_deserialize_from_media_server_json() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct IngressInfo {
            url: String,
            stream_key: SecretString,
        }

        let json = r#"{"url": "rtmp://media.local/live", "stream_key": "sk_from_wire"}"#;
        let info: IngressInfo = serde_json::from_str(json).expect("deserialize");

        assert_eq!(info.stream_key.expose_secret(), "sk_from_wire");
        assert!(!format!("{info:?}").contains("sk_from_wire"));
    }

    #[test]
    fn test_clone_keeps_value() {
        let secret = SecretString::from("cloneable");
        let cloned = secret.clone();
        assert_eq!(cloned.expose_secret(), "cloneable");
    }
}
