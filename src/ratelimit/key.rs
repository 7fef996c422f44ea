//! Window key generation and handling.

use crate::error::{CvGuardError, Result};

/// A key that uniquely identifies one rate window.
///
/// The key pairs the caller identifier (usually a client IP) with the
/// resource being protected. Keys compare field by field, so an identifier
/// containing `:` can never alias a different identifier/resource pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowKey {
    /// The caller identifier
    pub identifier: String,
    /// The protected resource (route or path)
    pub resource: String,
}

impl WindowKey {
    /// Create a new window key from an identifier and a resource.
    pub fn new(identifier: &str, resource: &str) -> Result<Self> {
        if identifier.is_empty() {
            return Err(CvGuardError::InvalidKey("identifier must not be empty".to_string()));
        }
        if resource.is_empty() {
            return Err(CvGuardError::InvalidKey("resource must not be empty".to_string()));
        }

        Ok(Self {
            identifier: identifier.to_string(),
            resource: resource.to_string(),
        })
    }

    /// Convert the key to its composite string form, `identifier:resource`.
    ///
    /// This is useful for logging and debugging.
    pub fn to_string_key(&self) -> String {
        format!("{}:{}", self.identifier, self.resource)
    }
}

impl std::fmt::Display for WindowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_key())
    }
}
