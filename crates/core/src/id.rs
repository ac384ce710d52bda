//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identifier of a report job.
///
/// Assigned by the job record store at creation (a database sequence in
/// production), so it is a plain positive integer rather than a UUID.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(i64);

macro_rules! impl_sequence_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Wrap a store-assigned sequence value.
            ///
            /// Sequence values start at 1; zero and negatives are rejected.
            pub fn new(value: i64) -> Result<Self, DomainError> {
                if value <= 0 {
                    return Err(DomainError::invalid_id(format!(
                        "{}: must be positive, got {}",
                        $name, value
                    )));
                }
                Ok(Self(value))
            }

            pub fn get(&self) -> i64 {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<$t> for i64 {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl TryFrom<i64> for $t {
            type Error = DomainError;

            fn try_from(value: i64) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let value = s
                    .parse::<i64>()
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Self::new(value)
            }
        }
    };
}

impl_sequence_newtype!(JobId, "JobId");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_positive_ids() {
        let id: JobId = "101".parse().unwrap();
        assert_eq!(id.get(), 101);
        assert_eq!(id.to_string(), "101");
    }

    #[test]
    fn rejects_non_positive_and_garbage() {
        assert!(matches!("0".parse::<JobId>(), Err(DomainError::InvalidId(_))));
        assert!(matches!("-4".parse::<JobId>(), Err(DomainError::InvalidId(_))));
        assert!(matches!("abc".parse::<JobId>(), Err(DomainError::InvalidId(_))));
        assert!(matches!("../1".parse::<JobId>(), Err(DomainError::InvalidId(_))));
    }

    #[test]
    fn serializes_as_bare_number() {
        let id = JobId::new(7).unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "7");
    }
}
