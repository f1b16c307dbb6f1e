#![allow(clippy::uninlined_format_args)]

use scanguard::config::HistoryConfig;
use scanguard::history::{HistoryFilter, HistoryStore};
use scanguard::orchestrator::{ScanOrchestrator, ScanPolicy, ScanState};
use scanguard::presenter::present;
use scanguard::verification::ScriptedVerifier;
use scanguard::{ContentType, VerdictLabel, VerifyError};
use std::sync::Arc;
use std::time::Duration;

fn fast_policy() -> ScanPolicy {
    ScanPolicy {
        retry_base_delay: Duration::from_millis(20),
        retry_max_delay: Duration::from_millis(100),
        poll_interval: Duration::from_millis(50),
        ..ScanPolicy::default()
    }
}

fn orchestrator(verifier: ScriptedVerifier, history: Arc<HistoryStore>) -> ScanOrchestrator {
    ScanOrchestrator::new(Arc::new(verifier), history, fast_policy())
}

fn check(name: &str, ok: bool, failures: &mut u32) {
    if ok {
        println!("✅ {}", name);
    } else {
        println!("❌ {}", name);
        *failures += 1;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    println!("Running scan scenarios against the local mock verifier...\n");
    let mut failures = 0;

    let history = Arc::new(HistoryStore::in_memory(&HistoryConfig {
        dedupe_window_secs: 0,
        ..HistoryConfig::default()
    }));
    let scanner = orchestrator(ScriptedVerifier::new(), history.clone());

    let cases = [
        ("A: safe URL", "https://safe-site.example", VerdictLabel::Safe),
        ("B: redirecting URL", "https://redirecting.example", VerdictLabel::Warning),
        ("C: flagged URL", "https://malware.example", VerdictLabel::Dangerous),
    ];
    for (name, payload, expected) in cases {
        let state = scanner.start_scan(payload)?.finished().await;
        let label = state.record().map(|r| r.verdict);
        println!(
            "   {} -> {}",
            payload,
            label.map(|l| present(l).text).unwrap_or("no record")
        );
        check(name, label == Some(expected), &mut failures);
    }

    let state = scanner.start_scan("+6591234567")?.finished().await;
    check(
        "D: phone number bypasses verification",
        matches!(
            &state,
            ScanState::BypassedFinal { record }
                if record.content_type == ContentType::Phone
                    && record.verdict == VerdictLabel::Unknown
        ),
        &mut failures,
    );

    let offline = orchestrator(
        ScriptedVerifier::new()
            .push_submit(Err(VerifyError::Transport("connection refused".into())))
            .push_submit(Err(VerifyError::Transport("connection refused".into())))
            .push_submit(Err(VerifyError::Transport("connection refused".into()))),
        history.clone(),
    );
    let state = offline.start_scan("https://safe-site.example")?.finished().await;
    check(
        "E: network failure is reported and recorded",
        matches!(&state, ScanState::Errored { reason, .. } if reason == "network unavailable"),
        &mut failures,
    );

    println!("\nHistory after scenarios A-E:");
    for (index, record) in history.list(HistoryFilter::All).iter().enumerate() {
        println!(
            "   [{}] {:<9} {:<7} {}",
            index,
            present(record.verdict).text,
            record.content_type.as_str(),
            record.raw_payload
        );
    }
    check("history holds five records", history.len() == 5, &mut failures);

    // F: bookmark the newest, delete the oldest
    let newest = history.list(HistoryFilter::All)[0].id;
    history.toggle_bookmark(0);
    let oldest = history.delete(Some(history.len() - 1));
    let bookmarked = history.list(HistoryFilter::Bookmarked);
    check(
        "F: bookmark and delete address the displayed order",
        bookmarked.len() == 1
            && bookmarked[0].id == newest
            && oldest.map(|r| r.raw_payload) == Some("https://safe-site.example".to_string())
            && history.len() == 4,
        &mut failures,
    );

    println!();
    if failures == 0 {
        println!("All scenarios passed");
        Ok(())
    } else {
        anyhow::bail!("{} scenario(s) failed", failures)
    }
}
