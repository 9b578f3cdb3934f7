//! Branded identifier types.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::GatewayError;

/// Opaque tenant (company) identifier.
///
/// Tenants are not created or destroyed by the gateway; an id is valid as
/// soon as a credential blob or an API call references it. Ids must be
/// non-empty and must not contain path separators or dot segments: the
/// credential store derives a directory name from the id, so anything
/// that could traverse out of the store root is rejected at construction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Create a tenant id, rejecting empty input and path-unsafe shapes.
    pub fn new(raw: impl Into<String>) -> Result<Self, GatewayError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(GatewayError::Validation("tenant id must not be empty".into()));
        }
        if raw == "." || raw == ".." || raw.contains(['/', '\\']) {
            return Err(GatewayError::Validation(
                "tenant id must not contain path separators or dot segments".into(),
            ));
        }
        Ok(Self(raw))
    }

    /// The raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TenantId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
