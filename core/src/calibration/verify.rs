use crate::{
	hash::file_checksum,
	resolver::{LogicalPathResolver, ResolveError},
	store::MetadataStore,
	Error, NonCriticalError,
};

use gg_task_system::{Interrupter, ProgressUpdate};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use super::{poll_cancel, report_progress};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChecksumMismatch {
	pub logical_path: String,
	pub repository: String,
	pub expected: String,
	pub actual: String,
}

#[derive(Debug, Default, Serialize)]
pub struct VerifyReport {
	pub verified: usize,
	/// Entries without a usable recorded digest.
	pub skipped: usize,
	/// Entries with a digest whose file resolves nowhere.
	pub missing: usize,
	pub mismatches: Vec<ChecksumMismatch>,
	pub errors: Vec<NonCriticalError>,
}

/// Re-hashes every resolvable entry that has a recorded digest. Read only.
#[instrument(skip_all, err)]
pub async fn verify_checksums(
	store: &Mutex<MetadataStore>,
	resolver: &LogicalPathResolver,
	interrupter: &Interrupter,
	poll_interval: usize,
) -> Result<VerifyReport, Error> {
	let entries = store.lock().await.snapshot();
	let mut report = VerifyReport::default();

	interrupter.report([
		ProgressUpdate::phase("verifying checksums"),
		ProgressUpdate::TaskCount(entries.len() as u64),
	]);

	for (idx, entry) in entries.iter().enumerate() {
		poll_cancel(interrupter, idx, poll_interval)?;
		report_progress(interrupter, idx, poll_interval);

		let Some(expected) = entry.attributes.recorded_md5() else {
			report.skipped += 1;
			continue;
		};

		let resolved = match resolver
			.resolve(&entry.logical_path, entry.owning_repository.as_deref())
			.await
		{
			Ok(resolved) => resolved,
			Err(ResolveError::NotFound(_)) => {
				report.missing += 1;
				continue;
			}
			Err(ResolveError::PathTraversal(path)) => {
				report.errors.push(NonCriticalError::PathTraversal(path));
				continue;
			}
		};

		let actual = match file_checksum(&resolved.path).await {
			Ok(actual) => actual,
			Err(e) => {
				report.errors.push(NonCriticalError::Hash(e.to_string()));
				continue;
			}
		};

		report.verified += 1;

		if !actual.eq_ignore_ascii_case(expected) {
			warn!(logical_path = %entry.logical_path, %expected, %actual, "Checksum mismatch");
			report.mismatches.push(ChecksumMismatch {
				logical_path: entry.logical_path.clone(),
				repository: resolved.repository,
				expected: expected.to_string(),
				actual,
			});
		}
	}

	info!(
		verified = report.verified,
		mismatches = report.mismatches.len(),
		skipped = report.skipped,
		"Checksum verification finished"
	);

	Ok(report)
}
