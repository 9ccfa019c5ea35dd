//! `mfetch download` / `mfetch resume` – run one artifact in the foreground.

use anyhow::Result;
use mfetch_core::coordinator::{Coordinator, ResumeOutcome, StartOutcome};
use mfetch_core::events::{DownloadEvent, EventLabel, Topic};
use mfetch_core::state_store::DownloadStatus;
use std::io::Write;

pub fn run_download(c: &Coordinator, id: &str) -> Result<()> {
    let sub = c.subscribe(Topic::key(id), print_event);
    let outcome = c.start(id);
    let result = match outcome {
        Ok(StartOutcome::Accepted) => follow(c, id),
        Ok(StartOutcome::AlreadyActive) => Err(anyhow::anyhow!("{} is already downloading", id)),
        Ok(StartOutcome::Unknown) => Err(anyhow::anyhow!("unknown artifact {}", id)),
        Err(e) => Err(e.into()),
    };
    c.unsubscribe(sub);
    result
}

pub fn run_resume(c: &Coordinator, id: &str) -> Result<()> {
    let sub = c.subscribe(Topic::key(id), print_event);
    let result = match c.resume(id) {
        Ok(ResumeOutcome::Accepted) => follow(c, id),
        Ok(ResumeOutcome::NotPaused) => Err(anyhow::anyhow!("{} is not paused", id)),
        Ok(ResumeOutcome::Unknown) => Err(anyhow::anyhow!("unknown artifact {}", id)),
        Err(e) => Err(e.into()),
    };
    c.unsubscribe(sub);
    result
}

fn follow(c: &Coordinator, id: &str) -> Result<()> {
    let rec = c.wait(id);
    c.flush()?;
    match rec.map(|r| (r.status, r.last_error_message)) {
        Some((DownloadStatus::Completed, _)) => {
            println!("{} installed under {}", id, c.layout().artifact_dir(id).display());
            Ok(())
        }
        Some((DownloadStatus::Failed, err)) => {
            anyhow::bail!("{} failed: {}", id, err.unwrap_or_else(|| "unknown error".to_string()))
        }
        Some((status, _)) => {
            println!("{} is {}", id, status);
            Ok(())
        }
        None => Ok(()),
    }
}

fn print_event(ev: &DownloadEvent) {
    let r = &ev.record;
    match ev.label {
        EventLabel::Chunk => {
            let done_mib = r.current_file_downloaded_bytes as f64 / 1_048_576.0;
            let total_mib = r.current_file_total_bytes as f64 / 1_048_576.0;
            print!(
                "\r  [{}/{}] {}  {:.1} / {:.1} MiB ({:.1}%)   ",
                r.completed_files + 1,
                r.total_files,
                r.current_file_path.as_deref().unwrap_or("?"),
                done_mib,
                total_mib,
                ev.progress_fraction * 100.0
            );
            let _ = std::io::stdout().flush();
        }
        EventLabel::FileDone => {
            println!("\r  done: {}{:30}", r.current_file_path.as_deref().unwrap_or("?"), "");
        }
        EventLabel::FileSkipped => {
            println!();
            if let Some(w) = r.warnings.last() {
                println!("  skipped optional file: {}", w);
            }
        }
        label if label.is_terminal() => println!("\n{}: {}", ev.artifact_id, label),
        label => println!("{}: {}", ev.artifact_id, label),
    }
}
