//! CLI command handlers, one file per command.

mod cancel;
mod checksum;
mod download;
mod forget;
mod list;
mod status;

pub use cancel::run_cancel;
pub use checksum::run_checksum;
pub use download::{run_download, run_resume};
pub use forget::run_forget;
pub use list::run_list;
pub use status::run_status;
