use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier correlating a source entity with its tracked row.
/// Derived entities (a work history assignment, for example) carry a
/// secondary component alongside the owning member's key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NaturalKey {
    primary: String,
    secondary: Option<String>,
}

impl NaturalKey {
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: None,
        }
    }

    pub fn composite(primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: Some(secondary.into()),
        }
    }

    pub fn primary(&self) -> &str {
        &self.primary
    }

    pub fn secondary(&self) -> Option<&str> {
        self.secondary.as_deref()
    }

    /// Secondary component as stored, the empty string standing in for none.
    pub fn secondary_column(&self) -> &str {
        self.secondary.as_deref().unwrap_or("")
    }

    pub fn from_columns(primary: String, secondary: String) -> Self {
        Self {
            primary,
            secondary: if secondary.is_empty() {
                None
            } else {
                Some(secondary)
            },
        }
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.secondary {
            Some(secondary) => write!(f, "{}/{}", self.primary, secondary),
            None => write!(f, "{}", self.primary),
        }
    }
}
