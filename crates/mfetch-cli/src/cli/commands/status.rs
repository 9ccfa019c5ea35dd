//! `mfetch status` – show download records.

use anyhow::Result;
use mfetch_core::coordinator::Coordinator;
use mfetch_core::state_store::DownloadRecord;

pub fn run_status(c: &Coordinator, id: Option<&str>) -> Result<()> {
    let ids: Vec<String> = match id {
        Some(id) => vec![id.to_string()],
        None => c.list_artifacts().iter().map(|a| a.id.clone()).collect(),
    };
    let rows: Vec<(String, DownloadRecord)> = ids
        .into_iter()
        .filter_map(|id| c.status(&id).map(|r| (id, r)))
        .collect();
    if rows.is_empty() {
        println!("No download records.");
        return Ok(());
    }
    println!("{:<28} {:<12} {:<14} {:<8} {}", "ID", "STATE", "FILES", "FILE %", "CURRENT");
    for (id, r) in rows {
        println!(
            "{:<28} {:<12} {:<14} {:<8} {}",
            id,
            r.status.as_str(),
            format!("{}/{} ({:.0}%)", r.completed_files, r.total_files, r.files_fraction() * 100.0),
            format!("{:.1}", r.progress_fraction() * 100.0),
            r.current_file_path.as_deref().unwrap_or("-")
        );
        if let Some(err) = &r.last_error_message {
            println!("    last error: {}", err);
        }
        for w in &r.warnings {
            println!("    warning: {}", w);
        }
    }
    Ok(())
}
