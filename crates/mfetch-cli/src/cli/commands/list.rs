//! `mfetch list` – catalog artifacts with install state.

use anyhow::Result;
use mfetch_core::coordinator::Coordinator;

pub fn run_list(c: &Coordinator) -> Result<()> {
    let artifacts = c.list_artifacts();
    if artifacts.is_empty() {
        println!("Catalog is empty.");
        return Ok(());
    }
    println!("{:<28} {:<10} {:>10}  {}", "ID", "INSTALLED", "SIZE", "DESCRIPTION");
    for a in artifacts {
        let total = a.expected_total_bytes();
        let size = if total > 0 {
            format!("{:.1} MiB", total as f64 / 1_048_576.0)
        } else {
            "-".to_string()
        };
        println!(
            "{:<28} {:<10} {:>10}  {}",
            a.id,
            if c.is_installed(&a.id) { "yes" } else { "no" },
            size,
            a.description
        );
    }
    Ok(())
}
