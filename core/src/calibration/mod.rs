//! Bulk consistency checks between the metadata store and the files on disk.

use crate::Error;

use gg_task_system::{Interrupter, ProgressUpdate};

mod backfill;
mod missing;
mod untracked;
mod verify;

pub use backfill::{backfill_owning_repository, BackfillReport};
pub use missing::{remove_entries, scan_missing, MissingEntry, MissingFilesReport, RemoveReport};
pub use untracked::{
	register_image, scan_untracked, Classification, RegisterRequest, UntrackedImage,
	UntrackedReport, LOCAL_PROVENANCE,
};
pub use verify::{verify_checksums, ChecksumMismatch, VerifyReport};

pub const DEFAULT_CANCEL_POLL_INTERVAL: usize = 50;

/// Checks for cancellation once every `interval` items.
fn poll_cancel(interrupter: &Interrupter, idx: usize, interval: usize) -> Result<(), Error> {
	if idx % interval.max(1) == 0 && interrupter.try_check_interrupt().is_some() {
		return Err(Error::Canceled);
	}

	Ok(())
}

fn report_progress(interrupter: &Interrupter, idx: usize, interval: usize) {
	if idx > 0 && idx % interval.max(1) == 0 {
		interrupter.report([ProgressUpdate::CompletedTaskCount(idx as u64)]);
	}
}
