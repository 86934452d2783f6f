//! Participant identifiers
//!
//! A participant is a data partition taking part in a distributed
//! transaction. Identifiers are plain names on the wire; validation happens
//! once at construction so the protocol layers never see a malformed one.

use crate::IdentityError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of a participating partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Create a participant identifier, rejecting empty or blank names.
    pub fn new(name: impl Into<String>) -> Result<Self, IdentityError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(IdentityError::InvalidParticipant(
                "participant name must not be empty".to_string(),
            ));
        }
        Ok(Self(name))
    }

    /// The participant name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
