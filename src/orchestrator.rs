use crate::classifier::{classify, ContentType, RawPayload};
use crate::config::VerificationConfig;
use crate::decode::FrameDecoder;
use crate::error::{ScanError, VerifyError};
use crate::history::{HistoryStore, ScanRecord};
use crate::lifecycle::LifecycleToken;
use crate::verdict::VerdictLabel;
use crate::verification::{VerificationOutcome, VerificationService};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;

/// Retry, polling and timeout budget for one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPolicy {
    pub submit_attempts: u32,
    pub fetch_transport_attempts: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    pub overall_timeout: Duration,
}

impl Default for ScanPolicy {
    fn default() -> Self {
        Self::from(&VerificationConfig::default())
    }
}

impl From<&VerificationConfig> for ScanPolicy {
    fn from(config: &VerificationConfig) -> Self {
        ScanPolicy {
            submit_attempts: config.submit_attempts.max(1),
            fetch_transport_attempts: config.fetch_transport_attempts.max(1),
            retry_base_delay: Duration::from_millis(500),
            retry_max_delay: Duration::from_secs(5),
            poll_interval: config.poll_interval(),
            max_poll_attempts: config.max_poll_attempts.max(1),
            overall_timeout: config.overall_timeout(),
        }
    }
}

impl ScanPolicy {
    /// Exponential backoff after the `attempt`th failed try (1-based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.retry_base_delay
            .saturating_mul(factor)
            .min(self.retry_max_delay)
    }
}

/// Transitions of a single scan, in the order they are published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Classified { content_type: ContentType },
    /// Non-URL payload, finalized without a network call.
    BypassedFinal { record: ScanRecord },
    AwaitingSubmit { attempt: u32 },
    AwaitingVerdict { job_id: String, poll: u32 },
    Final { record: ScanRecord },
    Errored { record: ScanRecord, reason: String },
    /// Cancelled before finalization. Nothing was added to history.
    Cancelled,
}

impl ScanState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanState::BypassedFinal { .. }
                | ScanState::Final { .. }
                | ScanState::Errored { .. }
                | ScanState::Cancelled
        )
    }

    /// The record handed to history, for finalized states.
    pub fn record(&self) -> Option<&ScanRecord> {
        match self {
            ScanState::BypassedFinal { record }
            | ScanState::Final { record }
            | ScanState::Errored { record, .. } => Some(record),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScanState::Idle => "idle",
            ScanState::Classified { .. } => "classified",
            ScanState::BypassedFinal { .. } => "bypassed",
            ScanState::AwaitingSubmit { .. } => "awaiting-submit",
            ScanState::AwaitingVerdict { .. } => "awaiting-verdict",
            ScanState::Final { .. } => "final",
            ScanState::Errored { .. } => "errored",
            ScanState::Cancelled => "cancelled",
        }
    }
}

/// Stream of state transitions for one scan.
///
/// The subscription owns the scan's lifecycle: dropping it cancels a scan
/// that has not finalized yet.
pub struct ScanSubscription {
    scan_id: u64,
    states: mpsc::UnboundedReceiver<ScanState>,
    token: LifecycleToken,
}

impl ScanSubscription {
    pub fn scan_id(&self) -> u64 {
        self.scan_id
    }

    /// Next transition, or `None` once the scan task is gone.
    pub async fn next(&mut self) -> Option<ScanState> {
        self.states.recv().await
    }

    /// Wait for the terminal state, skipping intermediate transitions.
    pub async fn finished(mut self) -> ScanState {
        while let Some(state) = self.states.recv().await {
            if state.is_terminal() {
                return state;
            }
        }
        ScanState::Cancelled
    }
}

impl Drop for ScanSubscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

struct ActiveScan {
    id: u64,
    token: LifecycleToken,
}

struct Shared {
    verifier: Arc<dyn VerificationService>,
    history: Arc<HistoryStore>,
    policy: ScanPolicy,
    active: Mutex<Option<ActiveScan>>,
    next_id: AtomicU64,
}

impl Shared {
    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveScan>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Drives scans through classify, submit, poll and finalize.
///
/// At most one scan is active at a time; new scans are rejected with
/// [`ScanError::AlreadyInProgress`] until the active one finalizes or is
/// cancelled.
pub struct ScanOrchestrator {
    shared: Arc<Shared>,
}

impl ScanOrchestrator {
    pub fn new(
        verifier: Arc<dyn VerificationService>,
        history: Arc<HistoryStore>,
        policy: ScanPolicy,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                verifier,
                history,
                policy,
                active: Mutex::new(None),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.shared.history
    }

    pub fn policy(&self) -> &ScanPolicy {
        &self.shared.policy
    }

    pub fn is_scanning(&self) -> bool {
        self.shared.lock_active().is_some()
    }

    /// Start scanning a decoded payload. Must be called within a tokio
    /// runtime; the scan runs as a spawned task.
    pub fn start_scan(&self, raw: &str) -> Result<ScanSubscription, ScanError> {
        let payload = RawPayload::new(raw).ok_or(ScanError::NoPayload)?;
        let token = LifecycleToken::new();

        let scan_id = {
            let mut active = self.shared.lock_active();
            if let Some(current) = active.as_ref() {
                log::debug!("Rejecting scan while scan {} is in progress", current.id);
                return Err(ScanError::AlreadyInProgress);
            }
            let scan_id = self.shared.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            *active = Some(ActiveScan {
                id: scan_id,
                token: token.clone(),
            });
            scan_id
        };

        let (sender, states) = mpsc::unbounded_channel();
        let task = ScanTask {
            shared: self.shared.clone(),
            scan_id,
            token: token.clone(),
            states: sender,
        };
        task.emit(ScanState::Idle);
        log::debug!("Starting scan {scan_id}: {payload}");
        tokio::spawn(task.run(payload));

        Ok(ScanSubscription {
            scan_id,
            states,
            token,
        })
    }

    /// Decode a frame and scan whatever it holds. Undecodable frames and
    /// frames without a code are both "no code found".
    pub fn scan_frame<D: FrameDecoder>(
        &self,
        decoder: &D,
        frame: &D::Frame,
    ) -> Result<ScanSubscription, ScanError> {
        match decoder.decode(frame) {
            Ok(Some(payload)) => self.start_scan(&payload),
            Ok(None) => Err(ScanError::NoPayload),
            Err(e) => {
                log::debug!("Frame could not be decoded: {e}");
                Err(ScanError::NoPayload)
            }
        }
    }

    /// Cancel the active scan, if any. Once this returns, the cancelled scan
    /// can no longer touch history. Returns whether a scan was cancelled.
    pub fn cancel_active_scan(&self) -> bool {
        let cancelled = self.shared.lock_active().take();
        match cancelled {
            Some(scan) => {
                scan.token.cancel();
                log::info!("Cancelled scan {}", scan.id);
                true
            }
            None => false,
        }
    }
}

struct ScanTask {
    shared: Arc<Shared>,
    scan_id: u64,
    token: LifecycleToken,
    states: mpsc::UnboundedSender<ScanState>,
}

impl ScanTask {
    fn emit(&self, state: ScanState) {
        log::debug!("Scan {} -> {}", self.scan_id, state.name());
        // A dropped subscription is handled through the token
        let _ = self.states.send(state);
    }

    async fn run(self, payload: RawPayload) {
        let content_type = classify(payload.as_str());
        self.emit(ScanState::Classified { content_type });

        if !content_type.requires_verification() {
            let record = ScanRecord::new(
                payload.into_inner(),
                content_type,
                VerdictLabel::Unknown,
                None,
            );
            self.finalize(record, |record| ScanState::BypassedFinal { record });
            return;
        }

        let overall = self.shared.policy.overall_timeout;
        let result = match tokio::time::timeout(overall, self.verify(payload.as_str())).await {
            Ok(Some(result)) => result,
            Ok(None) => {
                self.finish_cancelled();
                return;
            }
            Err(_) => Err(ScanError::Timeout),
        };

        match result {
            Ok(outcome) => {
                let label = outcome.label();
                let record =
                    ScanRecord::new(payload.into_inner(), content_type, label, Some(outcome));
                self.finalize(record, |record| ScanState::Final { record });
            }
            Err(err) => {
                let reason = err.reason();
                log::warn!("Scan {} errored: {reason}", self.scan_id);
                let record = ScanRecord::new(
                    payload.into_inner(),
                    content_type,
                    VerdictLabel::Unknown,
                    Some(VerificationOutcome::Failed {
                        reason: reason.clone(),
                    }),
                );
                self.finalize(record, |record| ScanState::Errored { record, reason });
            }
        }
    }

    /// Submit, then poll until a terminal outcome. `None` means cancelled.
    async fn verify(&self, url: &str) -> Option<Result<VerificationOutcome, ScanError>> {
        let policy = &self.shared.policy;
        let verifier = &self.shared.verifier;

        let mut attempt = 0;
        let job_id = loop {
            attempt += 1;
            self.emit(ScanState::AwaitingSubmit { attempt });
            match self.token.run(verifier.submit(url)).await? {
                Ok(job_id) => break job_id,
                Err(VerifyError::Transport(detail)) if attempt < policy.submit_attempts => {
                    log::warn!(
                        "Submit attempt {attempt}/{} failed: {detail}",
                        policy.submit_attempts
                    );
                    if !self.token.sleep(policy.retry_delay(attempt)).await {
                        return None;
                    }
                }
                Err(err) => return Some(Err(err.into())),
            }
        };
        log::debug!("Scan {} submitted as job {job_id}", self.scan_id);

        for poll in 1..=policy.max_poll_attempts {
            self.emit(ScanState::AwaitingVerdict {
                job_id: job_id.clone(),
                poll,
            });
            if !self.token.sleep(policy.poll_interval).await {
                return None;
            }
            match self.fetch(&job_id).await? {
                Ok(VerificationOutcome::Pending { .. }) => {
                    log::debug!(
                        "Job {job_id} still pending ({poll}/{})",
                        policy.max_poll_attempts
                    );
                }
                Ok(VerificationOutcome::Failed { reason }) => {
                    return Some(Err(ScanError::Failed(reason)))
                }
                Ok(outcome) => return Some(Ok(outcome)),
                Err(err) => return Some(Err(err)),
            }
        }

        Some(Err(ScanError::Timeout))
    }

    /// One poll, retrying transport failures within the policy budget.
    async fn fetch(&self, job_id: &str) -> Option<Result<VerificationOutcome, ScanError>> {
        let policy = &self.shared.policy;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .token
                .run(self.shared.verifier.fetch_verdict(job_id))
                .await?
            {
                Ok(outcome) => return Some(Ok(outcome)),
                Err(VerifyError::Transport(detail))
                    if attempt < policy.fetch_transport_attempts =>
                {
                    log::warn!(
                        "Fetch attempt {attempt}/{} for job {job_id} failed: {detail}",
                        policy.fetch_transport_attempts
                    );
                    if !self.token.sleep(policy.retry_delay(attempt)).await {
                        return None;
                    }
                }
                Err(err) => return Some(Err(err.into())),
            }
        }
    }

    /// Release the scan lock if it is still ours. Returns whether the scan
    /// may still commit, i.e. it was neither cancelled nor superseded.
    fn release(&self, active: &mut Option<ActiveScan>) -> bool {
        match active.as_ref() {
            Some(scan) if scan.id == self.scan_id => {
                let live = !scan.token.is_cancelled();
                *active = None;
                live
            }
            _ => false,
        }
    }

    /// Hand the record to history and publish the terminal state. The append
    /// happens under the scan lock so it cannot race a cancellation.
    ///
    /// With a file-backed store this blocks the runtime thread for one
    /// history rewrite.
    fn finalize(&self, record: ScanRecord, terminal: impl FnOnce(ScanRecord) -> ScanState) {
        let committed = {
            let mut active = self.shared.lock_active();
            let live = self.release(&mut active);
            if live {
                self.shared.history.append(record.clone());
            }
            live
        };

        if committed {
            log::info!(
                "Scan {} finalized: {} {} -> {}",
                self.scan_id,
                record.content_type,
                record.id,
                record.verdict
            );
            self.emit(terminal(record));
        } else {
            self.emit(ScanState::Cancelled);
        }
    }

    fn finish_cancelled(&self) {
        self.release(&mut self.shared.lock_active());
        self.emit(ScanState::Cancelled);
    }
}
