//! `mfetch forget` – remove an artifact's record from the journal.

use anyhow::Result;
use mfetch_core::coordinator::Coordinator;

pub fn run_forget(c: &Coordinator, id: &str) -> Result<()> {
    if c.forget(id)? {
        println!("Forgot {}.", id);
    } else {
        println!("No record for {}.", id);
    }
    Ok(())
}
