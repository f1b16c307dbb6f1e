use serde::{Deserialize, Serialize};
use std::fmt;

/// Finalized safety classification attached to a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerdictLabel {
    Safe,
    Warning,
    Dangerous,
    Unknown,
}

impl VerdictLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictLabel::Safe => "SAFE",
            VerdictLabel::Warning => "WARNING",
            VerdictLabel::Dangerous => "DANGEROUS",
            VerdictLabel::Unknown => "UNKNOWN",
        }
    }

    /// Lenient parse for labels coming from storage or other layers.
    /// Anything unrecognised is `Unknown`.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "SAFE" => VerdictLabel::Safe,
            "WARNING" => VerdictLabel::Warning,
            "DANGEROUS" => VerdictLabel::Dangerous,
            _ => VerdictLabel::Unknown,
        }
    }
}

impl fmt::Display for VerdictLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive the label for a completed verification.
///
/// Any positive detection is dangerous. A clean link that redirects is a
/// warning, since the final destination was not what the code displayed.
pub fn derive_label(positive_count: u32, redirect_chain: &[String]) -> VerdictLabel {
    if positive_count > 0 {
        VerdictLabel::Dangerous
    } else if redirect_chain.is_empty() {
        VerdictLabel::Safe
    } else {
        VerdictLabel::Warning
    }
}
