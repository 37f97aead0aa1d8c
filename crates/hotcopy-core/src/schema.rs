//! Validated database schema names
//!
//! A store may have several attached databases; a backup copies one of them,
//! selected by schema name. Names are validated at construction so engines
//! can hand them to C APIs without further checks.
//!
//! ```rust
//! use hotcopy_core::schema::SchemaName;
//!
//! assert_eq!(SchemaName::main().as_str(), "main");
//! assert!(SchemaName::new("archive_2024").is_some());
//! assert!(SchemaName::new("").is_none());
//! assert!(SchemaName::new("bad\0name").is_none());
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of an attached database inside a store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SchemaName(String);

impl SchemaName {
    /// Maximum length for schema names
    pub const MAX_LENGTH: usize = 64;

    /// Create a schema name with validation
    ///
    /// # Validation Rules
    ///
    /// - Non-empty
    /// - Maximum 64 characters
    /// - Only ASCII alphanumeric and underscore
    pub fn new(name: impl Into<String>) -> Option<Self> {
        let name = name.into();

        if name.is_empty() || name.len() > Self::MAX_LENGTH {
            return None;
        }

        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return None;
        }

        Some(Self(name))
    }

    /// The primary database of a store
    pub fn main() -> Self {
        Self("main".to_string())
    }

    /// The temporary database of a store
    pub fn temp() -> Self {
        Self("temp".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SchemaName {
    fn default() -> Self {
        Self::main()
    }
}

impl TryFrom<String> for SchemaName {
    type Error = SchemaNameError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        Self::new(name.clone()).ok_or(SchemaNameError::Invalid { name })
    }
}

impl From<SchemaName> for String {
    fn from(name: SchemaName) -> Self {
        name.0
    }
}

impl fmt::Display for SchemaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for SchemaName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Errors that can occur when creating a SchemaName
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaNameError {
    #[error("Invalid schema name: {name}")]
    Invalid { name: String },
}

/// Identifier attached to every log line a session emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
