use core::str::FromStr;
use serde::{Deserialize, Serialize};

/// Identity of an authenticated principal (a login name such as `shift.lead.7`).
///
/// This is what a report job records as its requester.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PrincipalId(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("principal id must be a non-empty name without control characters")]
pub struct InvalidPrincipalId;

impl PrincipalId {
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidPrincipalId> {
        let name = name.into();
        if name.trim().is_empty() || name.chars().any(char::is_control) {
            return Err(InvalidPrincipalId);
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PrincipalId {
    type Error = InvalidPrincipalId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PrincipalId> for String {
    fn from(value: PrincipalId) -> Self {
        value.0
    }
}

impl FromStr for PrincipalId {
    type Err = InvalidPrincipalId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
