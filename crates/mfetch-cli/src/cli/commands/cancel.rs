//! `mfetch cancel` – drop partial data and reset the record to idle.

use anyhow::Result;
use mfetch_core::coordinator::{ControlOutcome, Coordinator};

pub fn run_cancel(c: &Coordinator, id: &str) -> Result<()> {
    match c.cancel(id)? {
        ControlOutcome::Cancelled | ControlOutcome::Requested => println!("Cancelled {}.", id),
        ControlOutcome::NotActive => println!("Nothing to cancel for {}.", id),
        ControlOutcome::Unknown => anyhow::bail!("unknown artifact {}", id),
    }
    Ok(())
}
