use crate::{
	resolver::{LogicalPathResolver, ResolveError},
	store::MetadataStore,
	Error, NonCriticalError,
};

use gg_task_system::{Interrupter, ProgressUpdate};

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, trace};

use super::{poll_cancel, report_progress};

#[derive(Debug, Default, Serialize)]
pub struct BackfillReport {
	pub processed: usize,
	/// Entries that had no owning repository.
	pub added: usize,
	/// Entries whose owning repository was wrong.
	pub corrected: usize,
	/// Entries already pointing at the right repository.
	pub unchanged: usize,
	/// Entries whose file resolves nowhere, their prior value is kept.
	pub still_missing: usize,
	pub written: bool,
	pub errors: Vec<NonCriticalError>,
}

/// Points every entry's owning repository at the repository that actually holds its file.
///
/// Resolution happens on a snapshot without holding the store. Updates are then applied by
/// logical path in one persisted mutation, and only if at least one entry changes. A second
/// run right after a successful one writes nothing.
#[instrument(skip_all, err)]
pub async fn backfill_owning_repository(
	store: &Mutex<MetadataStore>,
	resolver: &LogicalPathResolver,
	interrupter: &Interrupter,
	poll_interval: usize,
) -> Result<BackfillReport, Error> {
	let entries = store.lock().await.snapshot();
	let mut report = BackfillReport::default();
	let mut updates = HashMap::new();

	interrupter.report([
		ProgressUpdate::phase("resolving owning repositories"),
		ProgressUpdate::TaskCount(entries.len() as u64),
	]);

	for (idx, entry) in entries.iter().enumerate() {
		// Nothing was persisted yet, so stopping here discards the pending updates
		poll_cancel(interrupter, idx, poll_interval)?;
		report_progress(interrupter, idx, poll_interval);

		report.processed += 1;

		// A declared repository that still holds the file is kept, the ordered scan only
		// decides for entries without one or with a stale one
		let declared = entry
			.owning_repository
			.as_deref()
			.filter(|repository| !repository.is_empty());
		let resolved = match resolver.resolve(&entry.logical_path, declared).await {
			Ok(resolved) => resolved,
			Err(ResolveError::NotFound(_)) => {
				trace!(logical_path = %entry.logical_path, "Still missing");
				report.still_missing += 1;
				continue;
			}
			Err(ResolveError::PathTraversal(path)) => {
				report.errors.push(NonCriticalError::PathTraversal(path));
				continue;
			}
		};

		match entry.owning_repository.as_deref() {
			Some(current) if current == resolved.repository => report.unchanged += 1,
			Some(current) if !current.is_empty() => {
				debug!(
					logical_path = %entry.logical_path,
					from = current,
					to = %resolved.repository,
					"Correcting owning repository"
				);
				report.corrected += 1;
				updates.insert(entry.logical_path.clone(), resolved.repository);
			}
			_ => {
				report.added += 1;
				updates.insert(entry.logical_path.clone(), resolved.repository);
			}
		}
	}

	poll_cancel(interrupter, 0, 1)?;

	if !updates.is_empty() {
		interrupter.report([ProgressUpdate::phase("saving")]);
		store
			.lock()
			.await
			.set_owning_repositories(&updates)
			.await?;
		report.written = true;
	}

	info!(
		processed = report.processed,
		added = report.added,
		corrected = report.corrected,
		still_missing = report.still_missing,
		written = report.written,
		"Owning repository backfill finished"
	);

	Ok(report)
}
