//! The block-detection coordinator.
//!
//! A single consumer drains attempt reports, feeds the detector, and owns
//! the pause latch. When the detector trips, every worker is held at its
//! next checkpoint while the configured policy runs; the latch is always
//! re-set on the way out so no worker can be stranded.

use std::io::IsTerminal;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::blocking::{AttemptReport, BlockDetector, BlockStats};
use crate::config::{BlockAction, BlockConfig};
use crate::pause::PauseSignal;

/// Consume attempt reports until the sentinel arrives, pausing and resuming
/// the fleet per the configured policy.
pub async fn run_coordinator(
    mut rx: mpsc::UnboundedReceiver<Option<AttemptReport>>,
    pause: PauseSignal,
    config: BlockConfig,
    quiet: bool,
) {
    let mut detector = BlockDetector::new(config.threshold, config.window_size);

    while let Some(message) = rx.recv().await {
        let Some(report) = message else { break };

        detector.record_attempt(&report);
        let (is_blocked, stats) = detector.is_likely_blocked();
        if !is_blocked {
            continue;
        }

        // Hold every worker at its next checkpoint before anything else.
        pause.clear();
        if let Some(stats) = &stats {
            report_block(stats);
        }

        match config.action {
            BlockAction::Warn => {
                warn!("blocking detected, continuing anyway (block-action warn)");
                pause.set();
            }
            BlockAction::Abort => {
                error!("blocking detected, aborting crawl (block-action abort)");
                std::process::exit(1);
            }
            BlockAction::Pause => {
                handle_pause_prompt(&pause, config.auto_resume_secs, quiet).await;
            }
        }

        detector.reset();
    }

    // No worker may be left stranded, whatever ended the loop.
    if !pause.is_set() {
        warn!("coordinator exiting while paused, resuming workers");
        pause.set();
    }
}

fn report_block(stats: &BlockStats) {
    warn!(
        blocking_failures = stats.blocking_failures,
        total_attempts = stats.total_attempts,
        blocking_rate = %format!("{:.0}%", stats.blocking_rate * 100.0),
        unique_domains = stats.unique_domains,
        affected = %stats.affected_domains.join(", "),
        retry_queue = stats.retry_queue_size,
        "IP blocking detected"
    );
}

/// Interactive pause handling. Headless or quiet sessions auto-resume;
/// otherwise the operator chooses continue or quit, with an auto-resume
/// timeout so an unattended terminal cannot stall the run forever.
async fn handle_pause_prompt(pause: &PauseSignal, auto_resume_secs: u64, quiet: bool) {
    if quiet || !std::io::stdin().is_terminal() {
        warn!("block detected in quiet/headless mode, auto-resuming");
        pause.set();
        return;
    }

    eprintln!();
    eprintln!("{}", "=".repeat(60));
    eprintln!("CRAWL PAUSED - blocking detected");
    eprintln!("{}", "=".repeat(60));
    eprintln!();
    eprintln!("Options:");
    eprintln!("  [c] Continue crawling from current position");
    eprintln!("  [q] Quit gracefully (checkpoint saved)");
    if auto_resume_secs > 0 {
        eprintln!();
        eprintln!("Auto-resume in {auto_resume_secs}s if no input...");
    }
    eprint!("Your choice [c/q]: ");

    let choice = read_choice(auto_resume_secs).await;

    if choice == 'q' {
        info!("quitting gracefully, checkpoint saved");
        std::process::exit(0);
    }

    info!("resuming crawl");
    pause.set();
}

async fn read_choice(auto_resume_secs: u64) -> char {
    let mut line = String::new();
    let mut reader = BufReader::new(tokio::io::stdin());

    let read = reader.read_line(&mut line);
    let outcome = if auto_resume_secs > 0 {
        match timeout(Duration::from_secs(auto_resume_secs), read).await {
            Ok(result) => result,
            Err(_) => {
                eprintln!();
                eprintln!("Auto-resuming (timeout)");
                return 'c';
            }
        }
    } else {
        read.await
    };

    match outcome {
        Ok(_) => match line.trim().to_lowercase().as_str() {
            "q" => 'q',
            // Anything unrecognized means continue.
            _ => 'c',
        },
        Err(e) => {
            warn!(error = %e, "prompt input failed, auto-resuming");
            'c'
        }
    }
}
