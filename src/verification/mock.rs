use super::{VerificationOutcome, VerificationService};
use crate::error::VerifyError;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// In-process stand-in for the verification backend.
///
/// Scripted responses are consumed in order. Once a queue is empty the
/// verifier answers from the payload itself: anything mentioning `malware`
/// gets 5 positives, anything mentioning `redirect` gets a two-hop redirect
/// chain, everything else is clean.
#[derive(Default)]
pub struct ScriptedVerifier {
    submits: Mutex<VecDeque<Result<String, VerifyError>>>,
    fetches: Mutex<VecDeque<Result<VerificationOutcome, VerifyError>>>,
    jobs: Mutex<HashMap<String, String>>,
    latency: Duration,
    submit_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulated round-trip time for every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn push_submit(self, result: Result<String, VerifyError>) -> Self {
        lock(&self.submits).push_back(result);
        self
    }

    pub fn push_fetch(self, result: Result<VerificationOutcome, VerifyError>) -> Self {
        lock(&self.fetches).push_back(result);
        self
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were ever in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        guard
    }

    fn outcome_for_payload(payload: &str) -> VerificationOutcome {
        let lower = payload.to_lowercase();
        if lower.contains("malware") {
            VerificationOutcome::Complete {
                positive_count: 5,
                redirect_chain: Vec::new(),
                security_headers: BTreeMap::new(),
            }
        } else if lower.contains("redirect") {
            VerificationOutcome::Complete {
                positive_count: 0,
                redirect_chain: vec!["https://a".to_string(), "https://b".to_string()],
                security_headers: BTreeMap::new(),
            }
        } else {
            let mut headers = BTreeMap::new();
            headers.insert(
                "strict-transport-security".to_string(),
                "max-age=31536000".to_string(),
            );
            VerificationOutcome::Complete {
                positive_count: 0,
                redirect_chain: Vec::new(),
                security_headers: headers,
            }
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl VerificationService for ScriptedVerifier {
    async fn submit(&self, url: &str) -> Result<String, VerifyError> {
        let call = self.submit_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = self.enter().await;

        let scripted = lock(&self.submits).pop_front();
        let job_id = match scripted {
            Some(result) => result?,
            None => format!("job-{call}"),
        };
        lock(&self.jobs).insert(job_id.clone(), url.to_string());
        Ok(job_id)
    }

    async fn fetch_verdict(&self, job_id: &str) -> Result<VerificationOutcome, VerifyError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.enter().await;

        if let Some(result) = lock(&self.fetches).pop_front() {
            return result;
        }
        match lock(&self.jobs).get(job_id) {
            Some(payload) => Ok(Self::outcome_for_payload(payload)),
            None => Err(VerifyError::Service(format!("unknown job id: {job_id}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_payload_keyed_answers() {
        let verifier = ScriptedVerifier::new();

        let job = verifier.submit("https://malware.example").await.unwrap();
        let outcome = verifier.fetch_verdict(&job).await.unwrap();
        assert!(matches!(
            outcome,
            VerificationOutcome::Complete { positive_count: 5, .. }
        ));

        let job = verifier.submit("https://redirecting.example").await.unwrap();
        match verifier.fetch_verdict(&job).await.unwrap() {
            VerificationOutcome::Complete { redirect_chain, .. } => {
                assert_eq!(redirect_chain.len(), 2)
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        assert_eq!(verifier.submit_calls(), 2);
        assert_eq!(verifier.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn test_scripts_consumed_in_order() {
        let verifier = ScriptedVerifier::new()
            .push_submit(Err(VerifyError::Transport("down".into())))
            .push_submit(Ok("fixed-id".into()));

        assert!(verifier.submit("https://x.example").await.is_err());
        assert_eq!(
            verifier.submit("https://x.example").await.unwrap(),
            "fixed-id"
        );
        assert_eq!(
            verifier.submit("https://x.example").await.unwrap(),
            "job-3"
        );
    }

    #[tokio::test]
    async fn test_unknown_job_is_service_error() {
        let verifier = ScriptedVerifier::new();
        assert!(matches!(
            verifier.fetch_verdict("nope").await,
            Err(VerifyError::Service(_))
        ));
    }
}
