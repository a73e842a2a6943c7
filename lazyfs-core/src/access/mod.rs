//! Per-file access control.

mod controller;
mod record;

pub use controller::{FileTable, SETTLE_DELAY_SECS};
pub use record::FileRecord;
