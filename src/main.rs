use clap::{Arg, ArgAction, Command};
use log::LevelFilter;
use scanguard::history::{HistoryFilter, HistoryStore, JsonFileStore, ScanRecord};
use scanguard::orchestrator::{ScanOrchestrator, ScanPolicy, ScanState, ScanSubscription};
use scanguard::presenter::present;
use scanguard::verification::{HttpVerificationClient, ScriptedVerifier, VerificationService};
use scanguard::{Config, PlainTextDecoder, ScanError};
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let matches = Command::new("scanguard")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Classify scanned codes and verify URLs against a remote scanner")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/scanguard.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("scan")
                .long("scan")
                .value_name("PAYLOAD")
                .help("Scan a decoded payload")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("scan-file")
                .long("scan-file")
                .value_name("FILE")
                .help("Scan the payload saved in a text dump")
                .action(ArgAction::Set)
                .conflicts_with("scan"),
        )
        .arg(
            Arg::new("mock")
                .long("mock")
                .help("Answer verification requests locally instead of calling the service")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("history")
                .long("history")
                .help("List scan history, most recent first")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("bookmarks")
                .long("bookmarks")
                .help("List bookmarked scans, most recent first")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("toggle-bookmark")
                .long("toggle-bookmark")
                .value_name("N")
                .help("Toggle the bookmark on history entry N")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("delete")
                .long("delete")
                .value_name("N")
                .help("Delete history entry N")
                .value_parser(clap::value_parser!(usize)),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("/etc/scanguard.yaml");
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e:#}");
            process::exit(1);
        }
    };

    let history = Arc::new(open_history(&config));

    if let Some(&index) = matches.get_one::<usize>("toggle-bookmark") {
        match history.toggle_bookmark(index) {
            Some(true) => println!("★ Bookmarked entry {index}"),
            Some(false) => println!("Removed bookmark from entry {index}"),
            None => println!("No history entry {index}"),
        }
        return;
    }

    if let Some(&index) = matches.get_one::<usize>("delete") {
        match history.delete(Some(index)) {
            Some(record) => println!("🗑  Deleted {}", record.raw_payload),
            None => println!("No history entry {index}"),
        }
        return;
    }

    if matches.get_flag("history") || matches.get_flag("bookmarks") {
        let filter = if matches.get_flag("bookmarks") {
            HistoryFilter::Bookmarked
        } else {
            HistoryFilter::All
        };
        print_history(&history, filter);
        return;
    }

    let scan_payload = matches.get_one::<String>("scan");
    let scan_file = matches.get_one::<String>("scan-file");
    if scan_payload.is_none() && scan_file.is_none() {
        eprintln!("Nothing to do. Use --scan, --scan-file or --history (see --help)");
        process::exit(2);
    }

    let verifier: Arc<dyn VerificationService> = if matches.get_flag("mock") {
        log::info!("Using local mock verifier");
        Arc::new(ScriptedVerifier::new())
    } else {
        match HttpVerificationClient::new(&config.verification) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                eprintln!("Error creating verification client: {e}");
                process::exit(1);
            }
        }
    };

    let orchestrator = ScanOrchestrator::new(
        verifier,
        history,
        ScanPolicy::from(&config.verification),
    );

    let started = match (scan_payload, scan_file) {
        (Some(payload), _) => orchestrator.start_scan(payload),
        (None, Some(path)) => match std::fs::read(path) {
            Ok(frame) => orchestrator.scan_frame(&PlainTextDecoder, frame.as_slice()),
            Err(e) => {
                eprintln!("Error reading {path}: {e}");
                process::exit(1);
            }
        },
        (None, None) => Err(ScanError::NoPayload),
    };

    let subscription = match started {
        Ok(subscription) => subscription,
        Err(ScanError::NoPayload) => {
            println!("No code found");
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Error starting scan: {e}");
            process::exit(1);
        }
    };

    match follow_scan(&orchestrator, subscription).await {
        ScanState::Final { record } | ScanState::BypassedFinal { record } => {
            print_result(&record);
        }
        ScanState::Errored { record, reason } => {
            print_result(&record);
            eprintln!("Verification failed: {reason}");
            process::exit(1);
        }
        _ => {
            println!("Scan cancelled");
            process::exit(130);
        }
    }
}

/// Stream transitions until the scan is terminal. Ctrl-C cancels the scan.
async fn follow_scan(
    orchestrator: &ScanOrchestrator,
    mut subscription: ScanSubscription,
) -> ScanState {
    loop {
        tokio::select! {
            state = subscription.next() => {
                let Some(state) = state else {
                    return ScanState::Cancelled;
                };
                match &state {
                    ScanState::Classified { content_type } => {
                        println!("🔍 Detected {content_type}");
                    }
                    ScanState::AwaitingSubmit { attempt } if *attempt > 1 => {
                        println!("   Retrying submission (attempt {attempt})");
                    }
                    ScanState::AwaitingVerdict { job_id, poll: 1 } => {
                        println!("   Submitted for verification (job {job_id})");
                    }
                    _ => {}
                }
                if state.is_terminal() {
                    return state;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                if orchestrator.cancel_active_scan() {
                    log::info!("Cancellation requested");
                }
            }
        }
    }
}

fn print_result(record: &ScanRecord) {
    let presentation = present(record.verdict);
    let marker = match record.verdict {
        scanguard::VerdictLabel::Dangerous => "⛔",
        scanguard::VerdictLabel::Warning => "⚠️ ",
        scanguard::VerdictLabel::Safe => "✅",
        scanguard::VerdictLabel::Unknown => "❔",
    };
    println!();
    println!("{marker} {} ({})", presentation.text, presentation.color);
    println!("   Type:    {}", record.content_type);
    println!("   Payload: {}", record.raw_payload);
    if let Some(scanguard::VerificationOutcome::Complete {
        positive_count,
        redirect_chain,
        security_headers,
    }) = &record.verification
    {
        println!("   Engines flagging: {positive_count}");
        if !redirect_chain.is_empty() {
            println!("   Redirects: {}", redirect_chain.join(" -> "));
        }
        for (name, value) in security_headers {
            println!("   {name}: {value}");
        }
    }
}

fn print_history(history: &HistoryStore, filter: HistoryFilter) {
    let records = history.list(filter);
    if records.is_empty() {
        println!("📭 No scans recorded");
        return;
    }

    println!("┌─────┬─────┬────────────┬─────────┬──────────────────────────────────────────┐");
    println!("│   # │     │ Verdict    │ Type    │ Payload                                  │");
    println!("├─────┼─────┼────────────┼─────────┼──────────────────────────────────────────┤");
    for (index, record) in records.iter().enumerate() {
        let star = if record.bookmarked { "★" } else { " " };
        println!(
            "│ {:>3} │  {}  │ {:<10} │ {:<7} │ {:<40} │",
            index,
            star,
            present(record.verdict).text,
            record.content_type.as_str(),
            truncate_string(&record.raw_payload, 40)
        );
    }
    println!("└─────┴─────┴────────────┴─────────┴──────────────────────────────────────────┘");
}

fn open_history(config: &Config) -> HistoryStore {
    match JsonFileStore::open(&config.history.path) {
        Ok(store) => HistoryStore::open(Box::new(store), &config.history),
        Err(e) => {
            log::warn!("History file unavailable, keeping history in memory: {e:#}");
            HistoryStore::in_memory(&config.history)
        }
    }
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    let config = if std::path::Path::new(path).exists() {
        Config::from_file(path)?
    } else {
        log::warn!("Configuration file '{path}' not found, using default configuration");
        Config::default()
    };
    config.validate()?;
    Ok(config)
}

fn generate_default_config(path: &str) {
    let config = Config::default();
    match config.to_file(path) {
        Ok(()) => {
            println!("Default configuration written to: {path}");
            println!("Please edit the configuration file to suit your needs.");
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e}");
            process::exit(1);
        }
    }
}

fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
