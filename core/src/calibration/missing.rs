use crate::{
	resolver::{LogicalPathResolver, ResolveError},
	store::{GalleryEntry, MetadataStore},
	Error, NonCriticalError,
};

use gg_task_system::{Interrupter, ProgressUpdate};

use std::collections::HashSet;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, instrument};

use super::{poll_cancel, report_progress};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingEntry {
	pub logical_path: String,
	pub identity: Option<String>,
	pub group_name: String,
	pub owning_repository: Option<String>,
}

impl From<&GalleryEntry> for MissingEntry {
	fn from(entry: &GalleryEntry) -> Self {
		Self {
			logical_path: entry.logical_path.clone(),
			identity: entry.identity.clone(),
			group_name: entry.group_name.clone(),
			owning_repository: entry.owning_repository.clone(),
		}
	}
}

#[derive(Debug, Default, Serialize)]
pub struct MissingFilesReport {
	pub checked: usize,
	pub missing: Vec<MissingEntry>,
	pub errors: Vec<NonCriticalError>,
}

/// Lists entries whose file resolves in no repository. Read only.
#[instrument(skip_all, err)]
pub async fn scan_missing(
	store: &Mutex<MetadataStore>,
	resolver: &LogicalPathResolver,
	interrupter: &Interrupter,
	poll_interval: usize,
) -> Result<MissingFilesReport, Error> {
	let entries = store.lock().await.snapshot();
	let mut report = MissingFilesReport::default();

	interrupter.report([
		ProgressUpdate::phase("checking files"),
		ProgressUpdate::TaskCount(entries.len() as u64),
	]);

	for (idx, entry) in entries.iter().enumerate() {
		poll_cancel(interrupter, idx, poll_interval)?;
		report_progress(interrupter, idx, poll_interval);

		report.checked += 1;

		match resolver
			.resolve(&entry.logical_path, entry.owning_repository.as_deref())
			.await
		{
			Ok(_) => {}
			Err(ResolveError::NotFound(_)) => report.missing.push(entry.into()),
			Err(ResolveError::PathTraversal(path)) => {
				report.errors.push(NonCriticalError::PathTraversal(path));
			}
		}
	}

	info!(
		checked = report.checked,
		missing = report.missing.len(),
		"Missing file scan finished"
	);

	Ok(report)
}

#[derive(Debug, Default, Serialize)]
pub struct RemoveReport {
	pub requested: usize,
	pub removed: usize,
}

/// Drops the entries with the given logical paths and persists, writing nothing when none
/// of them is in the store.
#[instrument(skip_all, fields(requested = logical_paths.len()), err)]
pub async fn remove_entries(
	store: &Mutex<MetadataStore>,
	logical_paths: &[String],
) -> Result<RemoveReport, Error> {
	let targets = logical_paths
		.iter()
		.map(|path| path.replace('\\', "/"))
		.collect::<HashSet<_>>();

	let removed = store.lock().await.remove_by_logical_paths(&targets).await?;

	info!(removed, "Removed metadata entries");

	Ok(RemoveReport {
		requested: targets.len(),
		removed,
	})
}
