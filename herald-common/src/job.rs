use serde::{Deserialize, Serialize};

/// Identifier for a submitted send job.
///
/// ULIDs are lexicographically sortable by creation time, which keeps job
/// logs readable without a separate sequence counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(ulid::Ulid);

impl JobId {
    /// Generate a new unique job ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new())
    }

    #[must_use]
    pub const fn ulid(&self) -> ulid::Ulid {
        self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl serde::Serialize for JobId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for JobId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let id = ulid::Ulid::from_string(&s).map_err(serde::de::Error::custom)?;
        Ok(Self(id))
    }
}

/// One submitted unit of work: a template pair applied across all pending
/// recipients at a configured pace.
///
/// Jobs are immutable once enqueued. Exactly one job is active while the
/// dispatch worker runs; further submissions queue behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendJob {
    pub id: JobId,
    pub subject_template: String,
    pub body_template: String,
    /// Pacing between iterations, in seconds. Zero means no pacing.
    pub interval_secs: u64,
}

impl SendJob {
    /// Create a job with a freshly generated ID.
    #[must_use]
    pub fn new(
        subject_template: impl Into<String>,
        body_template: impl Into<String>,
        interval_secs: u64,
    ) -> Self {
        Self {
            id: JobId::generate(),
            subject_template: subject_template.into(),
            body_template: body_template.into(),
            interval_secs,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_job_ids_are_unique() {
        let a = SendJob::new("s", "b", 5);
        let b = SendJob::new("s", "b", 5);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_job_id_serde_round_trip() {
        let id = JobId::generate();
        let encoded = serde_json::to_string(&id).unwrap();
        let decoded: JobId = serde_json::from_str(&encoded).unwrap();
        assert_eq!(id, decoded);
    }
}
