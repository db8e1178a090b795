use crate::{
	hash::file_checksum,
	identity::{self, IdentityKind},
	resolver::{LogicalPath, LogicalPathResolver},
	repository::RepositorySet,
	store::{EntryAttributes, GalleryEntry, Layout, MetadataStore},
	walk::walk_images,
	Error, NonCriticalError, KNOWN_GALLERIES,
};

use gg_task_system::{Interrupter, ProgressUpdate};

use std::{collections::HashSet, path::PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use tokio::{fs, sync::Mutex};
use tracing::{debug, info, instrument};

/// Provenance recorded on entries created from files found on disk.
pub const LOCAL_PROVENANCE: &str = "local_generation";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UntrackedImage {
	pub repository: String,
	/// Folder directly holding the image, used as the entry's group name.
	pub group_name: String,
	pub file_name: String,
	pub logical_path: String,
	pub physical_path: PathBuf,
}

#[derive(Debug, Default, Serialize)]
pub struct UntrackedReport {
	pub images: Vec<UntrackedImage>,
	pub errors: Vec<NonCriticalError>,
}

/// Lists images under the known gallery folders that have no entry yet.
///
/// Repositories are walked in order and a logical path found in several of them is reported
/// once, for the first repository holding it.
#[instrument(skip_all, fields(repositories = repositories.len()), err)]
pub async fn scan_untracked(
	store: &Mutex<MetadataStore>,
	repositories: &RepositorySet,
	interrupter: &Interrupter,
) -> Result<UntrackedReport, Error> {
	let tracked = store
		.lock()
		.await
		.entries()
		.iter()
		.map(|entry| entry.logical_path.clone())
		.collect::<HashSet<_>>();

	let mut seen = HashSet::new();
	let mut report = UntrackedReport::default();

	interrupter.report([
		ProgressUpdate::phase("looking for untracked images"),
		ProgressUpdate::TaskCount((repositories.len() * KNOWN_GALLERIES.len()) as u64),
	]);

	let mut done = 0;
	for repository in repositories.iter() {
		for gallery in KNOWN_GALLERIES {
			let gallery_root = repository.root().join(gallery);
			done += 1;

			if !fs::metadata(&gallery_root)
				.await
				.is_ok_and(|metadata| metadata.is_dir())
			{
				continue;
			}

			let (images, errors) = walk_images(&gallery_root, interrupter).await?;
			report.errors.extend(errors);

			for physical_path in images {
				let Some(logical_path) = LogicalPath::from_relative(repository.root(), &physical_path)
				else {
					continue;
				};

				if tracked.contains(logical_path.as_str())
					|| !seen.insert(logical_path.as_str().to_string())
				{
					continue;
				}

				report.images.push(UntrackedImage {
					repository: repository.name().to_string(),
					group_name: logical_path.parent_name().to_string(),
					file_name: logical_path.file_name().to_string(),
					logical_path: logical_path.as_str().to_string(),
					physical_path,
				});
			}

			interrupter.report([ProgressUpdate::CompletedTaskCount(done as u64)]);
		}
	}

	info!(untracked = report.images.len(), "Untracked image scan finished");

	Ok(report)
}

/// Classification picked by the user when registering an image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Classification {
	pub is_px18: bool,
	pub is_rx18: bool,
	pub layout: Layout,
	pub is_easter_egg: bool,
	pub is_ai_image: bool,
	pub is_ban: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
	pub logical_path: String,
	/// Kept only if well formed and unused.
	#[serde(default)]
	pub identity: Option<String>,
	#[serde(default)]
	pub classification: Classification,
}

/// Creates and persists the entry for an image that exists on disk but not in the store.
#[instrument(skip_all, fields(logical_path = %request.logical_path), err)]
pub async fn register_image(
	store: &Mutex<MetadataStore>,
	resolver: &LogicalPathResolver,
	identity_kind: IdentityKind,
	request: RegisterRequest,
) -> Result<GalleryEntry, Error> {
	let logical_path = LogicalPath::new(&request.logical_path)?;
	let resolved = resolver.resolve_logical(&logical_path, None).await?;
	let md5 = file_checksum(&resolved.path).await?;

	let mut store = store.lock().await;

	let identity = identity::sanitize(request.identity.as_deref(), identity_kind, |candidate| {
		store.contains_identity(candidate)
	})?;

	let source_gallery = KNOWN_GALLERIES
		.contains(&logical_path.first_segment())
		.then(|| logical_path.first_segment().to_string());

	let Classification {
		is_px18,
		is_rx18,
		layout,
		is_easter_egg,
		is_ai_image,
		is_ban,
	} = request.classification;

	let entry = GalleryEntry {
		owning_repository: Some(resolved.repository),
		identity: Some(identity),
		group_name: logical_path.parent_name().to_string(),
		logical_path: logical_path.as_str().to_string(),
		attributes: EntryAttributes {
			filename: logical_path.file_name().to_string(),
			parent_folder: logical_path.parent_name().to_string(),
			is_px18,
			is_rx18,
			layout,
			is_easter_egg,
			is_ai_image,
			is_ban,
			md5: Some(md5),
			downloaded_from: Some(LOCAL_PROVENANCE.to_string()),
			extra: Map::new(),
		},
		last_modified: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
		source_gallery,
		extra: Map::new(),
	};

	store.append(entry.clone()).await?;

	debug!(identity = ?entry.identity, "Registered image");

	Ok(entry)
}
