/// Member Identity
///
/// Members are identified by a GUID v4. The id is the creator field in every
/// signed header and the lookup key in multi-recipient envelopes.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::MEMBER_ID_LENGTH;
use crate::error::MemberError;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberId(Uuid);

impl MemberId {
    /// A fresh random (v4) id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_bytes(bytes: [u8; MEMBER_ID_LENGTH]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, MemberError> {
        let arr: [u8; MEMBER_ID_LENGTH] = bytes
            .try_into()
            .map_err(|_| MemberError::InvalidJson(format!("member id must be {} bytes", MEMBER_ID_LENGTH)))?;
        Ok(Self(Uuid::from_bytes(arr)))
    }

    pub fn as_bytes(&self) -> &[u8; MEMBER_ID_LENGTH] {
        self.0.as_bytes()
    }
}

impl Default for MemberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemberId({})", self.0)
    }
}

impl FromStr for MemberId {
    type Err = MemberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| MemberError::InvalidJson(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_bytes() {
        let id = MemberId::new();
        let bytes = *id.as_bytes();
        assert_eq!(MemberId::from_bytes(bytes), id);
    }

    #[test]
    fn test_round_trip_string() {
        let id = MemberId::new();
        let parsed: MemberId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_distinct() {
        assert_ne!(MemberId::new(), MemberId::new());
    }

    #[test]
    fn test_from_slice_wrong_length() {
        assert!(MemberId::from_slice(&[0u8; 15]).is_err());
    }
}
