//! Transaction identity
//!
//! A transaction is identified by the session that issued it plus a
//! monotonically increasing transaction number scoped to that session. The
//! pair is the catalog key and the durable-record key, and is immutable once
//! created.

use crate::IdentityError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier for a client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a fresh session identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID (for deserialization and tests).
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Parse from string representation.
    pub fn parse(s: &str) -> Result<Self, IdentityError> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| IdentityError::InvalidSession(e.to_string()))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a single distributed transaction.
///
/// Total ordering is session first, then transaction number, which gives a
/// stable iteration order for persisted records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxnId {
    session: SessionId,
    number: u64,
}

impl TxnId {
    /// Create a transaction identity for a session-scoped transaction number.
    pub fn new(session: SessionId, number: u64) -> Self {
        Self { session, number }
    }

    /// The session this transaction belongs to.
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// The session-scoped transaction number.
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Parse from the `<session>.<number>` string form produced by `Display`.
    pub fn parse(s: &str) -> Result<Self, IdentityError> {
        let (session, number) = s
            .rsplit_once('.')
            .ok_or_else(|| IdentityError::InvalidTxn(format!("expected <session>.<number>: {}", s)))?;
        let session = SessionId::parse(session)?;
        let number = number
            .parse()
            .map_err(|_| IdentityError::InvalidTxn(format!("invalid transaction number: {}", number)))?;
        Ok(Self { session, number })
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.session, self.number)
    }
}

impl PartialOrd for TxnId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TxnId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.session
            .cmp(&other.session)
            .then(self.number.cmp(&other.number))
    }
}
