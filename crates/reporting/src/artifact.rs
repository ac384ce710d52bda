//! Artifact naming.
//!
//! A completed job has exactly one artifact, named `report-{id}.json`. Names
//! are only ever derived from a job id; a name arriving from a client is parsed
//! back into a job id and rebuilt, never joined onto a path as given.

use serde::{Deserialize, Serialize};

use minerep_core::{DomainError, DomainResult, JobId, ValueObject};

const PREFIX: &str = "report-";
const SUFFIX: &str = ".json";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ArtifactName {
    job_id: JobId,
    name: String,
}

impl ValueObject for ArtifactName {}

impl ArtifactName {
    pub fn for_job(id: JobId) -> Self {
        Self {
            job_id: id,
            name: format!("{PREFIX}{id}{SUFFIX}"),
        }
    }

    /// Resolve a client-supplied name.
    ///
    /// Anything carrying a path separator, a parent reference or a NUL byte is
    /// rejected outright; what remains must be exactly the canonical
    /// `report-<id>.json` (no leading zeros, no extra extension).
    pub fn parse_requested(raw: &str) -> DomainResult<Self> {
        if raw.is_empty() {
            return Err(DomainError::validation("artifact name is empty"));
        }
        if raw.contains(['/', '\\', '\0']) || raw.contains("..") {
            return Err(DomainError::validation(
                "artifact name must be a bare file name",
            ));
        }
        let id = raw
            .strip_prefix(PREFIX)
            .and_then(|rest| rest.strip_suffix(SUFFIX))
            .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| DomainError::validation(format!("not a report artifact: {raw}")))?;
        let name = Self::for_job(id.parse()?);
        if name.name != raw {
            return Err(DomainError::validation(format!("not a report artifact: {raw}")));
        }

        Ok(name)
    }

    /// Job id this artifact belongs to.
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Name of the temporary file the artifact is staged under before publish.
    pub fn staging_name(&self, nonce: &str) -> String {
        format!(".{}.{nonce}.tmp", self.name)
    }
}

impl core::fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<ArtifactName> for String {
    fn from(value: ArtifactName) -> Self {
        value.name
    }
}

impl TryFrom<String> for ArtifactName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse_requested(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn id(n: i64) -> JobId {
        JobId::new(n).unwrap()
    }

    #[test]
    fn name_is_derived_from_id() {
        let name = ArtifactName::for_job(id(101));
        assert_eq!(name.as_str(), "report-101.json");
        assert_eq!(name.job_id(), id(101));
    }

    #[test]
    fn accepts_exact_names() {
        let name = ArtifactName::parse_requested("report-42.json").unwrap();
        assert_eq!(name.job_id(), id(42));
    }

    #[test]
    fn rejects_traversal_and_foreign_names() {
        for raw in [
            "",
            "../report-1.json",
            "..%2Freport-1.json",
            "/etc/passwd",
            "..\\report-1.json",
            "sub/report-1.json",
            "report-1.json\0",
            "report-.json",
            "report-0.json",
            "report-1.json.bak",
            "report-1a.json",
            "report-007.json",
            "notes.txt",
            "..",
        ] {
            assert!(
                ArtifactName::parse_requested(raw).is_err(),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn staging_name_is_hidden_and_distinct() {
        let name = ArtifactName::for_job(id(7));
        let staging = name.staging_name("abc");
        assert!(staging.starts_with('.'));
        assert!(staging.ends_with(".tmp"));
        assert_ne!(staging, name.as_str());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: nothing containing a separator or parent reference ever
        /// resolves to an artifact.
        #[test]
        fn traversal_never_resolves(
            prefix in "[a-z0-9./\\\\-]{0,12}",
            sep in prop::sample::select(vec!["/", "\\", "..", "\0"]),
            suffix in "[a-z0-9./\\\\-]{0,12}",
        ) {
            let raw = format!("{prefix}{sep}{suffix}");
            prop_assert!(ArtifactName::parse_requested(&raw).is_err());
        }

        /// Property: whatever is accepted is a bare name rebuilt from a job id.
        #[test]
        fn accepted_names_are_canonical(raw in "\\PC{0,24}") {
            if let Ok(name) = ArtifactName::parse_requested(&raw) {
                prop_assert!(!name.as_str().contains(['/', '\\']));
                prop_assert_eq!(name.as_str(), raw.as_str());
                prop_assert_eq!(name.clone(), ArtifactName::for_job(name.job_id()));
            }
        }

        #[test]
        fn every_job_id_round_trips(n in 1i64..i64::MAX) {
            let name = ArtifactName::for_job(id(n));
            prop_assert_eq!(ArtifactName::parse_requested(name.as_str()).unwrap(), name);
        }
    }
}
