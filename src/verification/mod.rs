pub mod client;
pub mod mock;

use crate::error::VerifyError;
use crate::verdict::{derive_label, VerdictLabel};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use client::HttpVerificationClient;
pub use mock::ScriptedVerifier;

/// Result envelope of a verification job.
///
/// `Pending` may move to exactly one of `Complete` or `Failed`; the terminal
/// variants never change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerificationOutcome {
    Pending {
        job_id: String,
    },
    Complete {
        positive_count: u32,
        #[serde(default)]
        redirect_chain: Vec<String>,
        #[serde(default)]
        security_headers: BTreeMap<String, String>,
    },
    Failed {
        reason: String,
    },
}

impl VerificationOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, VerificationOutcome::Pending { .. })
    }

    /// Verdict implied by this outcome. Only `Complete` carries evidence.
    pub fn label(&self) -> VerdictLabel {
        match self {
            VerificationOutcome::Complete {
                positive_count,
                redirect_chain,
                ..
            } => derive_label(*positive_count, redirect_chain),
            _ => VerdictLabel::Unknown,
        }
    }
}

/// Remote reputation/verification backend.
///
/// Each call is a single outbound request. Implementations never retry;
/// retry and polling policy belongs to the orchestrator.
#[async_trait]
pub trait VerificationService: Send + Sync {
    /// Submit a URL for analysis, returning the backend's job id.
    async fn submit(&self, url: &str) -> Result<String, VerifyError>;

    /// Fetch the current state of a job. "Still processing" is `Pending`.
    async fn fetch_verdict(&self, job_id: &str) -> Result<VerificationOutcome, VerifyError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!VerificationOutcome::Pending {
            job_id: "j".into()
        }
        .is_terminal());
        assert!(VerificationOutcome::Failed {
            reason: "x".into()
        }
        .is_terminal());
        assert!(VerificationOutcome::Complete {
            positive_count: 0,
            redirect_chain: vec![],
            security_headers: BTreeMap::new(),
        }
        .is_terminal());
    }

    #[test]
    fn test_outcome_label() {
        let complete = VerificationOutcome::Complete {
            positive_count: 0,
            redirect_chain: vec!["https://a".into()],
            security_headers: BTreeMap::new(),
        };
        assert_eq!(complete.label(), VerdictLabel::Warning);

        let failed = VerificationOutcome::Failed {
            reason: "boom".into(),
        };
        assert_eq!(failed.label(), VerdictLabel::Unknown);
    }

    #[test]
    fn test_outcome_serde_shape() {
        let json = r#"{"status":"complete","positive_count":3}"#;
        let outcome: VerificationOutcome = serde_json::from_str(json).unwrap();
        assert_eq!(
            outcome,
            VerificationOutcome::Complete {
                positive_count: 3,
                redirect_chain: vec![],
                security_headers: BTreeMap::new(),
            }
        );
    }
}
