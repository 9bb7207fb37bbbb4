use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::log_sanitizer::mask_secret;

/// API key/secret pair used to obtain a bearer token from the remote API.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCredentials {
    pub api_key: String,
    pub api_token: String,
}

impl RemoteCredentials {
    pub fn new(api_key: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_token: api_token.into(),
        }
    }

    /// Both halves present and non-blank.
    pub fn is_complete(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.api_token.trim().is_empty()
    }

    pub fn masked(&self) -> MaskedCredentials {
        MaskedCredentials {
            has_credentials: self.is_complete(),
            api_key: mask_secret(&self.api_key),
            api_token: mask_secret(&self.api_token),
        }
    }
}

// Credentials end up in config structs that derive Debug.
impl fmt::Debug for RemoteCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteCredentials")
            .field("api_key", &mask_secret(&self.api_key))
            .field("api_token", &mask_secret(&self.api_token))
            .finish()
    }
}

/// Credentials as persisted: each half sealed by the encryption service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedCredentials {
    pub api_key_encrypted: String,
    pub api_token_encrypted: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaskedCredentials {
    pub has_credentials: bool,
    pub api_key: String,
    pub api_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_halves_are_incomplete() {
        assert!(!RemoteCredentials::new("key", "  ").is_complete());
        assert!(!RemoteCredentials::default().is_complete());
        assert!(RemoteCredentials::new("key", "secret").is_complete());
    }

    #[test]
    fn debug_output_never_contains_the_secret() {
        let creds = RemoteCredentials::new("my-api-key-123", "super-secret-token");
        let printed = format!("{:?}", creds);
        assert!(!printed.contains("super-secret-token"));
        assert!(!printed.contains("my-api-key-123"));
    }
}
