pub mod classifier;
pub mod config;
pub mod decode;
pub mod error;
pub mod history;
pub mod lifecycle;
pub mod orchestrator;
pub mod presenter;
pub mod verdict;
pub mod verification;

pub use classifier::{classify, ContentType, RawPayload};
pub use config::Config;
pub use decode::{FrameDecoder, PlainTextDecoder};
pub use error::{DecodeError, ScanError, VerifyError};
pub use history::{HistoryFilter, HistoryStore, JsonFileStore, MemoryStore, RecordStore, ScanRecord};
pub use lifecycle::LifecycleToken;
pub use orchestrator::{ScanOrchestrator, ScanPolicy, ScanState, ScanSubscription};
pub use presenter::{present, Intent, Presentation};
pub use verdict::{derive_label, VerdictLabel};
pub use verification::{
    HttpVerificationClient, ScriptedVerifier, VerificationOutcome, VerificationService,
};
