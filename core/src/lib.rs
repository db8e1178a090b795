#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

//! Resolution and consistency engine for an image gallery sharded over several directory
//! trees.
//!
//! A [`Gallery`] ties together the detected [`RepositorySet`], the [`LogicalPathResolver`],
//! the in-memory [`MetadataStore`] and a task system running the long operations in the
//! background.

use gg_task_system::{TaskEvent, TaskHandle, TaskKey, TaskProgress, TaskState, TaskSystem};
use gg_utils::error::FileIOError;

use std::{
	io,
	path::{Path, PathBuf},
	sync::Arc,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, instrument, warn};

pub mod calibration;
pub mod config;
pub mod hash;
pub mod identity;
pub mod jobs;
pub mod repository;
pub mod resolver;
pub mod sequence;
pub mod store;

mod walk;

pub use gg_task_system::Interrupter;

use calibration::{
	BackfillReport, MissingFilesReport, RegisterRequest, RemoveReport, UntrackedReport,
	VerifyReport,
};
use config::{ConfigError, EngineOptions};
use identity::IdentityError;
use jobs::{GalleryJob, JobTask};
use repository::{RepositoryError, RepositorySet};
use resolver::{LogicalPathResolver, ResolveError, ResolvedPath};
use sequence::{ApplyReport, FixPlan, SequenceReport};
use store::{GalleryEntry, MetadataStore, StoreError};

/// Directory below the primary root holding the metadata document and the gallery config.
pub const GALLERY_DATA_DIR: &str = "GuGuNiu-Gallery";
pub const IMAGE_DATA_FILE: &str = "ImageData.json";
pub const GALLERY_CONFIG_FILE: &str = "GalleryConfig.yaml";

/// Top level folders of a repository that hold character images.
pub const KNOWN_GALLERIES: [&str; 4] = [
	"gs-character",
	"sr-character",
	"zzz-character",
	"waves-character",
];

#[derive(Debug, Error)]
pub enum Error {
	#[error(transparent)]
	Repository(#[from] RepositoryError),
	#[error(transparent)]
	Resolve(#[from] ResolveError),
	#[error(transparent)]
	Store(#[from] StoreError),
	#[error(transparent)]
	FileIO(#[from] FileIOError),
	#[error(transparent)]
	Identity(#[from] IdentityError),
	#[error(transparent)]
	Config(#[from] ConfigError),
	#[error(transparent)]
	TaskSystem(#[from] gg_task_system::TaskSystemError),
	#[error("operation canceled")]
	Canceled,
}

/// Coarse classification of [`Error`], for callers that only branch on the failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
	InvalidRoot,
	PathTraversal,
	NotFound,
	Io,
	Canceled,
	Inconsistent,
	Other,
}

impl Error {
	#[must_use]
	pub const fn kind(&self) -> ErrorKind {
		match self {
			Self::Repository(_) => ErrorKind::InvalidRoot,
			Self::Resolve(ResolveError::PathTraversal(_)) => ErrorKind::PathTraversal,
			Self::Resolve(ResolveError::NotFound(_)) => ErrorKind::NotFound,
			Self::FileIO(_) | Self::Store(StoreError::FileIO(_)) => ErrorKind::Io,
			Self::Store(StoreError::DuplicateLogicalPath(_)) => ErrorKind::Inconsistent,
			Self::Canceled => ErrorKind::Canceled,
			Self::Store(StoreError::Serialize(_))
			| Self::Identity(_)
			| Self::Config(_)
			| Self::TaskSystem(_) => ErrorKind::Other,
		}
	}
}

/// Per item problem met during a bulk operation. Collected into the operation's report
/// instead of aborting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum NonCriticalError {
	#[error("logical path escapes the repository root: {0}")]
	PathTraversal(String),
	#[error("walk error: {0}")]
	Walk(String),
	#[error("hash error: {0}")]
	Hash(String),
	#[error("file I/O error: {0}")]
	FileIO(String),
	#[error("rename source missing: {}", .0.display())]
	RenameSourceMissing(PathBuf),
	#[error("rename target already exists: {}", .0.display())]
	RenameTargetExists(PathBuf),
	#[error("failed to rename '{}' to '{}': {message}", .from.display(), .to.display())]
	Rename {
		from: PathBuf,
		to: PathBuf,
		message: String,
	},
	#[error("file left under temporary name: {}", .0.display())]
	StrandedTempFile(PathBuf),
}

impl NonCriticalError {
	pub(crate) fn rename(from: &Path, to: &Path, e: &io::Error) -> Self {
		Self::Rename {
			from: from.to_path_buf(),
			to: to.to_path_buf(),
			message: e.to_string(),
		}
	}
}

struct Inner {
	options: EngineOptions,
	resolver: LogicalPathResolver,
	store: Mutex<MetadataStore>,
	tasks: TaskSystem<Error>,
}

/// One open gallery. Cheap to clone, clones share everything.
#[derive(Clone)]
pub struct Gallery {
	inner: Arc<Inner>,
}

impl std::fmt::Debug for Gallery {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Gallery")
			.field("options", &self.inner.options)
			.field("resolver", &self.inner.resolver)
			.field("tasks", &self.inner.tasks)
			.finish_non_exhaustive()
	}
}

impl Gallery {
	/// Detects the repositories around `primary_root` and loads the metadata document.
	#[instrument(skip_all, fields(primary_root = %primary_root.as_ref().display()), err)]
	pub async fn open(
		primary_root: impl AsRef<Path>,
		options: EngineOptions,
	) -> Result<Self, Error> {
		let repositories = RepositorySet::detect(primary_root).await?;
		let store = load_store(&repositories).await?;

		info!(
			repositories = repositories.len(),
			entries = store.len(),
			"Gallery opened"
		);

		Ok(Self {
			inner: Arc::new(Inner {
				options,
				resolver: LogicalPathResolver::new(
					Arc::new(repositories),
					options.path_cache_capacity,
				),
				store: Mutex::new(store),
				tasks: TaskSystem::new(),
			}),
		})
	}

	#[must_use]
	pub fn options(&self) -> EngineOptions {
		self.inner.options
	}

	/// Switches to another primary root, rebuilding the repository set, dropping every cached
	/// resolution and reloading the metadata document.
	#[instrument(skip_all, fields(primary_root = %primary_root.as_ref().display()), err)]
	pub async fn select_primary_root(&self, primary_root: impl AsRef<Path>) -> Result<(), Error> {
		let repositories = RepositorySet::detect(primary_root).await?;
		let loaded = load_store(&repositories).await?;

		let mut store = self.inner.store.lock().await;
		self.inner
			.resolver
			.replace_repositories(Arc::new(repositories));
		*store = loaded;

		Ok(())
	}

	#[must_use]
	pub fn repositories(&self) -> Arc<RepositorySet> {
		self.inner.resolver.repositories()
	}

	pub async fn resolve(
		&self,
		logical_path: &str,
		declared_repository: Option<&str>,
	) -> Result<ResolvedPath, Error> {
		self.inner
			.resolver
			.resolve(logical_path, declared_repository)
			.await
			.map_err(Into::into)
	}

	pub async fn load_entries(&self) -> Vec<GalleryEntry> {
		self.inner.store.lock().await.snapshot()
	}

	pub async fn find_entry(&self, logical_path: &str) -> Option<GalleryEntry> {
		self.inner
			.store
			.lock()
			.await
			.find_by_logical_path(logical_path)
			.cloned()
	}

	/// Appends and persists `entry`. Its identity is replaced when missing, malformed or
	/// already used by another entry. Returns the entry as stored.
	pub async fn append_entry(&self, mut entry: GalleryEntry) -> Result<GalleryEntry, Error> {
		let mut store = self.inner.store.lock().await;

		entry.identity = Some(identity::sanitize(
			entry.identity.as_deref(),
			self.inner.options.identity_kind,
			|candidate| store.contains_identity(candidate),
		)?);

		store.append(entry.clone()).await?;

		Ok(entry)
	}

	pub async fn replace_entries(&self, entries: Vec<GalleryEntry>) -> Result<(), Error> {
		self.inner
			.store
			.lock()
			.await
			.replace_all(entries)
			.await
			.map_err(Into::into)
	}

	pub async fn hash_file(&self, path: impl AsRef<Path>) -> Result<String, Error> {
		hash::file_checksum(path).await.map_err(Into::into)
	}

	pub async fn scan_sequence_issues(
		&self,
		interrupter: &Interrupter,
	) -> Result<SequenceReport, Error> {
		sequence::scan_sequences(&self.repositories(), interrupter).await
	}

	pub async fn apply_fix_plan(
		&self,
		plan: &FixPlan,
		interrupter: &Interrupter,
	) -> Result<ApplyReport, Error> {
		let res = sequence::apply_fix_plan(plan, interrupter).await;
		// Files moved even when the run stopped early
		self.inner.resolver.invalidate();
		res
	}

	pub async fn scan_missing_files(
		&self,
		interrupter: &Interrupter,
	) -> Result<MissingFilesReport, Error> {
		calibration::scan_missing(
			&self.inner.store,
			&self.inner.resolver,
			interrupter,
			self.inner.options.cancel_poll_interval,
		)
		.await
	}

	pub async fn remove_entries(&self, logical_paths: &[String]) -> Result<RemoveReport, Error> {
		calibration::remove_entries(&self.inner.store, logical_paths).await
	}

	pub async fn backfill_owning_repository(
		&self,
		interrupter: &Interrupter,
	) -> Result<BackfillReport, Error> {
		calibration::backfill_owning_repository(
			&self.inner.store,
			&self.inner.resolver,
			interrupter,
			self.inner.options.cancel_poll_interval,
		)
		.await
	}

	pub async fn verify_checksums(&self, interrupter: &Interrupter) -> Result<VerifyReport, Error> {
		calibration::verify_checksums(
			&self.inner.store,
			&self.inner.resolver,
			interrupter,
			self.inner.options.cancel_poll_interval,
		)
		.await
	}

	pub async fn scan_untracked_images(
		&self,
		interrupter: &Interrupter,
	) -> Result<UntrackedReport, Error> {
		calibration::scan_untracked(&self.inner.store, &self.repositories(), interrupter).await
	}

	pub async fn register_image(&self, request: RegisterRequest) -> Result<GalleryEntry, Error> {
		let entry = calibration::register_image(
			&self.inner.store,
			&self.inner.resolver,
			self.inner.options.identity_kind,
			request,
		)
		.await?;

		self.inner.resolver.invalidate();

		Ok(entry)
	}

	/// Runs `job` in the background under its key. A second start of a key still running is
	/// rejected.
	pub fn start_task(&self, job: GalleryJob) -> Result<TaskHandle<Error>, Error> {
		let key = job.key();

		self.inner
			.tasks
			.dispatch(
				key,
				JobTask {
					gallery: self.clone(),
					job,
				},
			)
			.map_err(Into::into)
	}

	pub fn cancel_task(&self, key: &TaskKey) -> Result<(), Error> {
		self.inner.tasks.cancel(key).map_err(Into::into)
	}

	pub fn cancel_all_tasks(&self) {
		self.inner.tasks.cancel_all();
	}

	#[must_use]
	pub fn task_status(&self, key: &TaskKey) -> TaskState {
		self.inner.tasks.status(key)
	}

	#[must_use]
	pub fn task_progress(&self, key: &TaskKey) -> Option<TaskProgress> {
		self.inner.tasks.progress(key)
	}

	#[must_use]
	pub fn subscribe_tasks(&self) -> broadcast::Receiver<TaskEvent> {
		self.inner.tasks.subscribe()
	}
}

async fn load_store(repositories: &RepositorySet) -> Result<MetadataStore, Error> {
	let data_dir = repositories.data_dir().ok_or(RepositoryError::NoPrimary)?;

	if let Some(warning) = repositories.scan_warning() {
		warn!(%warning, "Sibling repositories could not be listed");
	}

	config::ensure_gallery_config(&data_dir).await?;

	MetadataStore::load(data_dir.join(IMAGE_DATA_FILE))
		.await
		.map_err(Into::into)
}
