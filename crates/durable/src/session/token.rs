//! Recreate tokens
//!
//! A token is an opaque byte sequence issued with every session. Passing it
//! to [`SessionManager::recreate`](super::SessionManager::recreate) rebinds
//! the same logical chain, preferring the worker that held it last. Inside
//! JSON payloads the bytes travel as base64.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use super::SessionError;

const TOKEN_VERSION: u8 = 1;

/// Opaque capability for rebinding a session chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RecreateToken(Vec<u8>);

impl RecreateToken {
    /// Token that carries no lineage
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Wrap raw token bytes
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Raw token bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Check if the token is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn issue(lineage: &SessionLineage) -> Result<Self, SessionError> {
        serde_json::to_vec(lineage)
            .map(Self)
            .map_err(|e| SessionError::InvalidToken(e.to_string()))
    }

    /// Decode the lineage carried by this token
    pub fn lineage(&self) -> Result<SessionLineage, SessionError> {
        if self.is_empty() {
            return Err(SessionError::InvalidToken("token is empty".to_string()));
        }

        let lineage: SessionLineage = serde_json::from_slice(&self.0)
            .map_err(|e| SessionError::InvalidToken(e.to_string()))?;
        if lineage.version != TOKEN_VERSION {
            return Err(SessionError::InvalidToken(format!(
                "unsupported token version {}",
                lineage.version
            )));
        }
        Ok(lineage)
    }
}

impl Serialize for RecreateToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for RecreateToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}

/// Session lineage carried inside a recreate token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionLineage {
    version: u8,

    /// First session of the chain
    pub root_session_id: Uuid,

    /// Session that issued the token
    pub session_id: Uuid,

    /// Worker the issuing session was bound to
    pub worker_id: String,

    /// Number of recreations since the root session
    pub generation: u32,
}

impl SessionLineage {
    pub(crate) fn new(
        root_session_id: Uuid,
        session_id: Uuid,
        worker_id: impl Into<String>,
        generation: u32,
    ) -> Self {
        Self {
            version: TOKEN_VERSION,
            root_session_id,
            session_id,
            worker_id: worker_id.into(),
            generation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_decode() {
        let root = Uuid::now_v7();
        let lineage = SessionLineage::new(root, Uuid::now_v7(), "w-1", 2);
        let token = RecreateToken::issue(&lineage).unwrap();

        assert!(!token.is_empty());
        assert_eq!(token.lineage().unwrap(), lineage);
    }

    #[test]
    fn test_empty_token_has_no_lineage() {
        let token = RecreateToken::empty();
        assert!(token.is_empty());
        assert!(matches!(
            token.lineage(),
            Err(SessionError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_garbage_token_is_rejected() {
        let token = RecreateToken::from_bytes(b"not a token".to_vec());
        assert!(matches!(
            token.lineage(),
            Err(SessionError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_token_travels_as_base64_in_json() {
        let lineage = SessionLineage::new(Uuid::now_v7(), Uuid::now_v7(), "w-1", 0);
        let token = RecreateToken::issue(&lineage).unwrap();

        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(json, serde_json::json!(STANDARD.encode(token.as_bytes())));

        let parsed: RecreateToken = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, token);
    }

    #[test]
    fn test_empty_token_serializes_as_empty_string() {
        let json = serde_json::to_string(&RecreateToken::empty()).unwrap();
        assert_eq!(json, "\"\"");
    }
}
