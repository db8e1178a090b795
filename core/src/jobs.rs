//! Long gallery operations packaged as background tasks.

use crate::{sequence::FixPlan, Error, Gallery};

use gg_task_system::{ExecStatus, Interrupter, IntoAnyTaskOutput, Task, TaskKey};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// The operations that can run through [`Gallery::start_task`]. Each kind has its own key, so
/// at most one of each runs at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum GalleryJob {
	ScanMissingFiles,
	RemoveEntries { logical_paths: Vec<String> },
	BackfillOwningRepository,
	ScanSequenceIssues,
	ApplyFixPlan { plan: FixPlan },
	VerifyChecksums,
	ScanUntrackedImages,
}

impl GalleryJob {
	#[must_use]
	pub fn key(&self) -> TaskKey {
		TaskKey::from(match self {
			Self::ScanMissingFiles => "scan_missing_files",
			Self::RemoveEntries { .. } => "remove_entries",
			Self::BackfillOwningRepository => "backfill_owning_repository",
			Self::ScanSequenceIssues => "scan_sequence_issues",
			Self::ApplyFixPlan { .. } => "apply_fix_plan",
			Self::VerifyChecksums => "verify_checksums",
			Self::ScanUntrackedImages => "scan_untracked_images",
		})
	}
}

pub(crate) struct JobTask {
	pub(crate) gallery: Gallery,
	pub(crate) job: GalleryJob,
}

#[async_trait]
impl Task<Error> for JobTask {
	#[instrument(skip_all, fields(key = %self.job.key()), err)]
	async fn run(&mut self, interrupter: &Interrupter) -> Result<ExecStatus, Error> {
		let gallery = &self.gallery;

		let res = match &self.job {
			GalleryJob::ScanMissingFiles => gallery
				.scan_missing_files(interrupter)
				.await
				.map(IntoAnyTaskOutput::into_output),
			GalleryJob::RemoveEntries { logical_paths } => gallery
				.remove_entries(logical_paths)
				.await
				.map(IntoAnyTaskOutput::into_output),
			GalleryJob::BackfillOwningRepository => gallery
				.backfill_owning_repository(interrupter)
				.await
				.map(IntoAnyTaskOutput::into_output),
			GalleryJob::ScanSequenceIssues => gallery
				.scan_sequence_issues(interrupter)
				.await
				.map(IntoAnyTaskOutput::into_output),
			GalleryJob::ApplyFixPlan { plan } => gallery
				.apply_fix_plan(plan, interrupter)
				.await
				.map(IntoAnyTaskOutput::into_output),
			GalleryJob::VerifyChecksums => gallery
				.verify_checksums(interrupter)
				.await
				.map(IntoAnyTaskOutput::into_output),
			GalleryJob::ScanUntrackedImages => gallery
				.scan_untracked_images(interrupter)
				.await
				.map(IntoAnyTaskOutput::into_output),
		};

		match res {
			Ok(output) => Ok(ExecStatus::Done(output)),
			Err(Error::Canceled) => {
				debug!("Job canceled");
				Ok(ExecStatus::Canceled)
			}
			Err(e) => Err(e),
		}
	}
}
