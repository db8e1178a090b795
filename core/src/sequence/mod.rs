//! Keeps every folder's images numbered `<folder>Gu1`, `<folder>Gu2`, ... without holes or
//! repeats.

use crate::{repository::RepositorySet, walk::walk_images, Error, NonCriticalError};

use gg_task_system::{Interrupter, ProgressUpdate};

use std::{
	collections::BTreeMap,
	path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

mod rename;
mod scan;

pub use rename::{apply_fix_plan, ApplyReport};
pub use scan::collate;

use scan::{detect_issues, needs_manual_resolution, plan_renames, SequenceFile};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SequenceIssue {
	Duplicate { number: u64, files: Vec<String> },
	DoesNotStartAtOne { lowest: u64 },
	/// Numbers `from..=to` are missing.
	Gap { from: u64, to: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameOp {
	pub from: String,
	pub to: String,
}

/// Renames inside one directory, by file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderFixPlan {
	pub folder: PathBuf,
	pub renames: Vec<RenameOp>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixPlan {
	pub folders: Vec<FolderFixPlan>,
}

impl FixPlan {
	#[must_use]
	pub fn len(&self) -> usize {
		self.folders.iter().map(|folder| folder.renames.len()).sum()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct FolderReport {
	pub repository: String,
	pub folder: PathBuf,
	pub issues: Vec<SequenceIssue>,
	pub needs_manual_resolution: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct SequenceReport {
	pub folders_scanned: usize,
	/// Only folders with at least one issue.
	pub folders: Vec<FolderReport>,
	pub plan: FixPlan,
	pub errors: Vec<NonCriticalError>,
}

/// Walks every repository and reports numbering issues along with the plan that fixes the
/// automatically fixable ones. Nothing is renamed here.
#[instrument(skip_all, fields(repositories = repositories.len()), err)]
pub async fn scan_sequences(
	repositories: &RepositorySet,
	interrupter: &Interrupter,
) -> Result<SequenceReport, Error> {
	let mut report = SequenceReport::default();

	interrupter.report([
		ProgressUpdate::phase("scanning sequences"),
		ProgressUpdate::TaskCount(repositories.len() as u64),
	]);

	for (idx, repository) in repositories.iter().enumerate() {
		let (images, errors) = walk_images(repository.root(), interrupter).await?;
		report.errors.extend(errors);

		let mut folders = BTreeMap::<&Path, Vec<SequenceFile>>::new();
		for image in &images {
			let (Some(folder), Some(name)) =
				(image.parent(), image.file_name().and_then(|name| name.to_str()))
			else {
				continue;
			};
			if let Some(file) = SequenceFile::parse(name) {
				folders.entry(folder).or_default().push(file);
			}
		}

		report.folders_scanned += folders.len();

		for (folder, files) in folders {
			let issues = detect_issues(&files);
			if issues.is_empty() {
				continue;
			}

			let folder_name = folder
				.file_name()
				.and_then(|name| name.to_str())
				.unwrap_or_default();

			let needs_manual_resolution = needs_manual_resolution(&files);
			if needs_manual_resolution {
				warn!(folder = %folder.display(), "Sequence needs manual resolution");
			} else {
				let renames = plan_renames(folder_name, &files);
				if !renames.is_empty() {
					report.plan.folders.push(FolderFixPlan {
						folder: folder.to_path_buf(),
						renames,
					});
				}
			}

			debug!(folder = %folder.display(), ?issues, "Sequence issues found");

			report.folders.push(FolderReport {
				repository: repository.name().to_string(),
				folder: folder.to_path_buf(),
				issues,
				needs_manual_resolution,
			});
		}

		interrupter.report([ProgressUpdate::CompletedTaskCount(idx as u64 + 1)]);
	}

	info!(
		folders_scanned = report.folders_scanned,
		folders_with_issues = report.folders.len(),
		planned_renames = report.plan.len(),
		errors = report.errors.len(),
		"Sequence scan finished"
	);

	Ok(report)
}
