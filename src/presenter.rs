use crate::verdict::VerdictLabel;
use serde::Serialize;

/// Visual intent for a verdict, independent of any particular UI toolkit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Danger,
    Warning,
    Success,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Presentation {
    pub text: &'static str,
    pub intent: Intent,
    pub color: &'static str,
}

/// Map a verdict to display text and intent. Total: unknown labels get the
/// neutral presentation.
pub fn present(label: VerdictLabel) -> Presentation {
    match label {
        VerdictLabel::Dangerous => Presentation {
            text: "Dangerous",
            intent: Intent::Danger,
            color: "#d32f2f",
        },
        VerdictLabel::Warning => Presentation {
            text: "Suspicious",
            intent: Intent::Warning,
            color: "#f57c00",
        },
        VerdictLabel::Safe => Presentation {
            text: "Safe",
            intent: Intent::Success,
            color: "#388e3c",
        },
        VerdictLabel::Unknown => Presentation {
            text: "Unknown",
            intent: Intent::Neutral,
            color: "#757575",
        },
    }
}
