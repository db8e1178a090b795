use crate::{Error, NonCriticalError};

use gg_task_system::{Interrupter, ProgressUpdate};

use std::{
	collections::HashSet,
	path::{Path, PathBuf},
};

use serde::Serialize;
use tokio::fs;
use tracing::{info, instrument, trace, warn};
use uuid::Uuid;

use super::{FixPlan, FolderFixPlan};

#[derive(Debug, Default, Serialize)]
pub struct ApplyReport {
	pub renamed: usize,
	pub errors: Vec<NonCriticalError>,
}

/// Executes a [`FixPlan`] folder by folder with a two phase rename.
///
/// Phase one moves every source to `<target><suffix>`, phase two strips the suffix. The
/// suffix is unique to this run, so targets that permute existing names never collide.
/// Cancellation is honored between folders only, a started folder always finishes both
/// phases. Renames already done are kept.
#[instrument(skip_all, fields(folders = plan.folders.len(), renames = plan.len()), err)]
pub async fn apply_fix_plan(
	plan: &FixPlan,
	interrupter: &Interrupter,
) -> Result<ApplyReport, Error> {
	let suffix = format!("_temp_{}", Uuid::new_v4().simple());
	let mut report = ApplyReport::default();

	interrupter.report([
		ProgressUpdate::phase("renaming"),
		ProgressUpdate::TaskCount(plan.folders.len() as u64),
		ProgressUpdate::CompletedTaskCount(0),
	]);

	for (idx, folder) in plan.folders.iter().enumerate() {
		if interrupter.try_check_interrupt().is_some() {
			info!(
				renamed = report.renamed,
				"Fix plan canceled, already renamed files are kept"
			);
			return Err(Error::Canceled);
		}

		apply_folder(folder, &suffix, &mut report).await;

		interrupter.report([ProgressUpdate::CompletedTaskCount(idx as u64 + 1)]);
	}

	info!(
		renamed = report.renamed,
		errors = report.errors.len(),
		"Fix plan applied"
	);

	Ok(report)
}

struct Staged {
	source: PathBuf,
	temp: PathBuf,
	target: PathBuf,
}

async fn apply_folder(plan: &FolderFixPlan, suffix: &str, report: &mut ApplyReport) {
	let sources = plan
		.renames
		.iter()
		.map(|op| op.from.to_lowercase())
		.collect::<HashSet<_>>();

	let mut staged = Vec::with_capacity(plan.renames.len());

	for op in &plan.renames {
		let source = plan.folder.join(&op.from);
		let target = plan.folder.join(&op.to);

		if !exists(&source).await {
			report
				.errors
				.push(NonCriticalError::RenameSourceMissing(source));
			continue;
		}

		// Targets that are sources themselves will have moved away during this phase
		if !sources.contains(&op.to.to_lowercase()) && exists(&target).await {
			report
				.errors
				.push(NonCriticalError::RenameTargetExists(target));
			continue;
		}

		let temp = plan.folder.join(format!("{}{suffix}", op.to));

		match fs::rename(&source, &temp).await {
			Ok(()) => staged.push(Staged {
				source,
				temp,
				target,
			}),
			Err(e) => report
				.errors
				.push(NonCriticalError::rename(&source, &temp, &e)),
		}
	}

	for Staged {
		source,
		temp,
		target,
	} in staged
	{
		if exists(&target).await {
			report
				.errors
				.push(NonCriticalError::RenameTargetExists(target));
			restore(&temp, &source, report).await;
			continue;
		}

		match fs::rename(&temp, &target).await {
			Ok(()) => {
				trace!(from = %source.display(), to = %target.display(), "Renamed");
				report.renamed += 1;
			}
			Err(e) => {
				report
					.errors
					.push(NonCriticalError::rename(&temp, &target, &e));
				restore(&temp, &source, report).await;
			}
		}
	}
}

/// Puts a temp named file back under its original name when that name is still free.
async fn restore(temp: &Path, source: &Path, report: &mut ApplyReport) {
	if !exists(source).await && fs::rename(temp, source).await.is_ok() {
		return;
	}

	warn!(temp = %temp.display(), "File left under its temporary name");
	report
		.errors
		.push(NonCriticalError::StrandedTempFile(temp.to_path_buf()));
}

async fn exists(path: &Path) -> bool {
	fs::symlink_metadata(path).await.is_ok()
}

#[cfg(test)]
mod tests {
	use super::*;

	use crate::sequence::RenameOp;

	use pretty_assertions::assert_eq;
	use tempfile::tempdir;

	fn op(from: &str, to: &str) -> RenameOp {
		RenameOp {
			from: from.to_string(),
			to: to.to_string(),
		}
	}

	async fn read(path: PathBuf) -> String {
		fs::read_to_string(path).await.unwrap()
	}

	#[tokio::test]
	async fn swap_keeps_every_byte() {
		let dir = tempdir().unwrap();
		let folder = dir.path().join("Alice");
		fs::create_dir(&folder).await.unwrap();
		fs::write(folder.join("AliceGu1.webp"), "one").await.unwrap();
		fs::write(folder.join("AliceGu2.webp"), "two").await.unwrap();

		let plan = FixPlan {
			folders: vec![FolderFixPlan {
				folder: folder.clone(),
				renames: vec![
					op("AliceGu2.webp", "AliceGu1.webp"),
					op("AliceGu1.webp", "AliceGu2.webp"),
				],
			}],
		};

		let report = apply_fix_plan(&plan, &Interrupter::detached())
			.await
			.unwrap();

		assert_eq!(report.renamed, 2);
		assert!(report.errors.is_empty());
		assert_eq!(read(folder.join("AliceGu1.webp")).await, "two");
		assert_eq!(read(folder.join("AliceGu2.webp")).await, "one");

		let mut names = Vec::new();
		let mut read_dir = fs::read_dir(&folder).await.unwrap();
		while let Some(entry) = read_dir.next_entry().await.unwrap() {
			names.push(entry.file_name().to_string_lossy().to_string());
		}
		names.sort();
		assert_eq!(names, vec!["AliceGu1.webp", "AliceGu2.webp"]);
	}

	#[tokio::test]
	async fn per_file_errors_do_not_abort_the_batch() {
		let dir = tempdir().unwrap();
		let folder = dir.path().join("Alice");
		fs::create_dir(&folder).await.unwrap();
		fs::write(folder.join("AliceGu3.webp"), "three").await.unwrap();
		fs::write(folder.join("AliceGu5.webp"), "five").await.unwrap();
		fs::write(folder.join("AliceGu9.webp"), "nine").await.unwrap();
		fs::write(folder.join("Blocker.webp"), "blocker").await.unwrap();

		let plan = FixPlan {
			folders: vec![FolderFixPlan {
				folder: folder.clone(),
				renames: vec![
					op("AliceGu7.webp", "AliceGu1.webp"),
					op("AliceGu3.webp", "Blocker.webp"),
					op("AliceGu5.webp", "AliceGu2.webp"),
					op("AliceGu9.webp", "AliceGu3.webp"),
				],
			}],
		};

		let report = apply_fix_plan(&plan, &Interrupter::detached())
			.await
			.unwrap();

		// The blocked source stays put, so the rename targeting its name is undone in phase two
		assert_eq!(report.renamed, 1);
		assert_eq!(report.errors.len(), 3);
		assert!(matches!(
			report.errors[0],
			NonCriticalError::RenameSourceMissing(_)
		));
		assert!(matches!(
			&report.errors[1],
			NonCriticalError::RenameTargetExists(path) if path.ends_with("Blocker.webp")
		));
		assert!(matches!(
			&report.errors[2],
			NonCriticalError::RenameTargetExists(path) if path.ends_with("AliceGu3.webp")
		));

		assert_eq!(read(folder.join("Blocker.webp")).await, "blocker");
		assert_eq!(read(folder.join("AliceGu2.webp")).await, "five");
		assert_eq!(read(folder.join("AliceGu3.webp")).await, "three");
		assert_eq!(read(folder.join("AliceGu9.webp")).await, "nine");
	}

	#[tokio::test]
	async fn canceled_before_start_touches_nothing() {
		let dir = tempdir().unwrap();
		let folder = dir.path().join("Alice");
		fs::create_dir(&folder).await.unwrap();
		fs::write(folder.join("AliceGu3.webp"), "three").await.unwrap();

		let plan = FixPlan {
			folders: vec![FolderFixPlan {
				folder: folder.clone(),
				renames: vec![op("AliceGu3.webp", "AliceGu1.webp")],
			}],
		};

		assert!(matches!(
			apply_fix_plan(&plan, &Interrupter::canceled()).await,
			Err(Error::Canceled)
		));
		assert!(folder.join("AliceGu3.webp").exists());
	}
}
