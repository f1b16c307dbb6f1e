use crate::classifier::ContentType;
use crate::verdict::VerdictLabel;
use crate::verification::VerificationOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A finalized scan as kept in history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub id: Uuid,
    pub raw_payload: String,
    pub content_type: ContentType,
    pub verdict: VerdictLabel,
    /// `None` when the payload bypassed verification.
    pub verification: Option<VerificationOutcome>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub bookmarked: bool,
}

impl ScanRecord {
    /// Only the orchestrator builds records, and only from terminal outcomes.
    pub(crate) fn new(
        raw_payload: String,
        content_type: ContentType,
        verdict: VerdictLabel,
        verification: Option<VerificationOutcome>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            raw_payload,
            content_type,
            verdict,
            verification,
            created_at: Utc::now(),
            bookmarked: false,
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.verification {
            Some(VerificationOutcome::Failed { reason }) => Some(reason),
            _ => None,
        }
    }

    pub fn was_verified(&self) -> bool {
        matches!(
            self.verification,
            Some(VerificationOutcome::Complete { .. })
        )
    }
}

#[cfg(test)]
pub(crate) fn sample(payload: &str) -> ScanRecord {
    ScanRecord::new(
        payload.to_string(),
        crate::classifier::classify(payload),
        VerdictLabel::Unknown,
        None,
    )
}
