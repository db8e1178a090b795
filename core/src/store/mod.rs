//! The single JSON document holding every gallery entry.
//!
//! The whole collection lives in memory and each mutation rewrites the document: the previous
//! document is copied to a timestamped backup, the new one is written to a sibling temp file
//! and renamed over the target. A failed write restores the in-memory collection.

use gg_utils::error::FileIOError;

use std::{
	collections::{HashMap, HashSet},
	ffi::OsString,
	path::{Path, PathBuf},
};

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{ser::PrettyFormatter, Serializer, Value};
use thiserror::Error;
use tokio::{fs, io};
use tracing::{debug, error, info, instrument, trace, warn};

mod entry;

pub use entry::{EntryAttributes, GalleryEntry, Layout};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

#[derive(Debug, Error)]
pub enum StoreError {
	#[error(transparent)]
	FileIO(#[from] FileIOError),
	#[error("failed to serialize metadata document: {0}")]
	Serialize(#[from] serde_json::Error),
	#[error("duplicate logical path in metadata store: <path='{0}'>")]
	DuplicateLogicalPath(String),
}

#[derive(Debug)]
pub struct MetadataStore {
	path: PathBuf,
	entries: Vec<GalleryEntry>,
	index: HashMap<String, usize>,
	/// Records that couldn't be decoded, written back verbatim after the entries.
	unparsed: Vec<Value>,
}

impl MetadataStore {
	/// Loads the document at `path`.
	///
	/// A missing, empty or unparsable document gives an empty store; only errors reading an
	/// existing file are returned.
	#[instrument(skip_all, fields(path = %path.as_ref().display()), err)]
	pub async fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
		let path = path.as_ref().to_path_buf();

		let (entries, unparsed) = match fs::read(&path).await {
			Ok(data) => decode_document(&path, &data),
			Err(e) if e.kind() == io::ErrorKind::NotFound => {
				info!("No metadata document yet, starting with an empty store");
				(Vec::new(), Vec::new())
			}
			Err(e) => {
				return Err(
					FileIOError::from((&path, e, "Failed to read metadata document")).into(),
				)
			}
		};

		let (entries, index) = dedup(entries);

		debug!(
			entries = entries.len(),
			unparsed = unparsed.len(),
			"Loaded metadata store"
		);

		Ok(Self {
			path,
			entries,
			index,
			unparsed,
		})
	}

	#[must_use]
	pub fn path(&self) -> &Path {
		&self.path
	}

	#[must_use]
	pub fn entries(&self) -> &[GalleryEntry] {
		&self.entries
	}

	#[must_use]
	pub fn snapshot(&self) -> Vec<GalleryEntry> {
		self.entries.clone()
	}

	/// Raw records the entry model can't represent. They survive every rewrite untouched.
	#[must_use]
	pub fn unparsed(&self) -> &[Value] {
		&self.unparsed
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	#[must_use]
	pub fn find_by_logical_path(&self, logical_path: &str) -> Option<&GalleryEntry> {
		let normalized = logical_path.replace('\\', "/");
		self.index
			.get(&normalized)
			.and_then(|&idx| self.entries.get(idx))
	}

	#[must_use]
	pub fn contains_identity(&self, identity: &str) -> bool {
		self.entries
			.iter()
			.any(|entry| entry.identity.as_deref() == Some(identity))
			|| self
				.unparsed
				.iter()
				.any(|value| value.get("gid").and_then(Value::as_str) == Some(identity))
	}

	pub async fn append(&mut self, entry: GalleryEntry) -> Result<(), StoreError> {
		if self.index.contains_key(&entry.logical_path) {
			return Err(StoreError::DuplicateLogicalPath(entry.logical_path));
		}

		self.mutate(|entries| {
			entries.push(entry);
			Ok(())
		})
		.await
	}

	pub async fn replace_all(&mut self, entries: Vec<GalleryEntry>) -> Result<(), StoreError> {
		self.mutate(|current| {
			*current = entries;
			Ok(())
		})
		.await
	}

	/// Removes every entry whose logical path is listed, returning how many went away.
	///
	/// Nothing is written when no entry matched.
	pub async fn remove_by_logical_paths(
		&mut self,
		logical_paths: &HashSet<String>,
	) -> Result<usize, StoreError> {
		let removed = self
			.entries
			.iter()
			.filter(|entry| logical_paths.contains(&entry.logical_path))
			.count();

		if removed == 0 {
			return Ok(0);
		}

		self.mutate(|entries| {
			entries.retain(|entry| !logical_paths.contains(&entry.logical_path));
			Ok(())
		})
		.await?;

		Ok(removed)
	}

	/// Sets the owning repository of the listed logical paths, skipping entries that already
	/// carry that value or have since disappeared. Returns how many entries changed.
	pub async fn set_owning_repositories(
		&mut self,
		updates: &HashMap<String, String>,
	) -> Result<usize, StoreError> {
		let changed = self
			.entries
			.iter()
			.filter(|entry| {
				updates.get(&entry.logical_path).is_some_and(|repository| {
					entry.owning_repository.as_deref() != Some(repository.as_str())
				})
			})
			.count();

		if changed == 0 {
			return Ok(0);
		}

		self.mutate(|entries| {
			for entry in entries.iter_mut() {
				if let Some(repository) = updates.get(&entry.logical_path) {
					entry.owning_repository = Some(repository.clone());
				}
			}
			Ok(())
		})
		.await?;

		Ok(changed)
	}

	/// Applies `f` to the collection and persists the result.
	///
	/// If `f` fails, the result holds duplicate logical paths, or the document can't be
	/// written, the collection is restored to what it was before the call.
	#[instrument(skip_all, fields(path = %self.path.display()), err)]
	pub async fn mutate(
		&mut self,
		f: impl FnOnce(&mut Vec<GalleryEntry>) -> Result<(), StoreError>,
	) -> Result<(), StoreError> {
		let previous = self.entries.clone();

		if let Err(e) = f(&mut self.entries) {
			self.entries = previous;
			return Err(e);
		}

		for entry in &mut self.entries {
			if entry.logical_path.contains('\\') {
				entry.logical_path = entry.logical_path.replace('\\', "/");
			}
		}

		let index = match build_index(&self.entries) {
			Ok(index) => index,
			Err(e) => {
				self.entries = previous;
				return Err(e);
			}
		};

		if let Err(e) = self.flush().await {
			error!(?e, "Failed to persist metadata document, rolling back in memory changes");
			self.entries = previous;
			return Err(e);
		}

		self.index = index;

		Ok(())
	}

	async fn flush(&self) -> Result<(), StoreError> {
		let bytes = encode_document(&self.entries, &self.unparsed)?;

		if let Some(parent) = self.path.parent() {
			fs::create_dir_all(parent).await.map_err(|e| {
				FileIOError::from((parent, e, "Failed to create metadata directory"))
			})?;
		}

		let backup = self.backup().await;

		let temp_path = sibling_with_suffix(&self.path, ".tmp");

		if let Err(e) = fs::write(&temp_path, &bytes).await {
			remove_leftover(&temp_path).await;
			return Err(
				FileIOError::from((&temp_path, e, "Failed to write metadata temp file")).into(),
			);
		}

		if let Err(e) = fs::rename(&temp_path, &self.path).await {
			remove_leftover(&temp_path).await;
			self.restore_if_corrupted(backup.as_deref()).await;
			return Err(
				FileIOError::from((&self.path, e, "Failed to replace metadata document")).into(),
			);
		}

		trace!(entries = self.entries.len(), "Persisted metadata document");

		Ok(())
	}

	/// Copies the current document aside, returning where. Failing to do so is only logged.
	async fn backup(&self) -> Option<PathBuf> {
		match fs::metadata(&self.path).await {
			Ok(metadata) if metadata.is_file() => {}
			Ok(_) => return None,
			Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
			Err(e) => {
				warn!(?e, "Failed to check metadata document before backup");
				return None;
			}
		}

		let backup_path = sibling_with_suffix(
			&self.path,
			&format!(".bak_{}", Local::now().format("%Y%m%d_%H%M%S_%3f")),
		);

		match fs::copy(&self.path, &backup_path).await {
			Ok(_) => {
				debug!(backup = %backup_path.display(), "Backed up metadata document");
				Some(backup_path)
			}
			Err(e) => {
				warn!(
					backup = %backup_path.display(),
					?e,
					"Failed to back up metadata document, writing anyway"
				);
				None
			}
		}
	}

	async fn restore_if_corrupted(&self, backup: Option<&Path>) {
		let intact = match fs::read(&self.path).await {
			Ok(data) => {
				let data = data.strip_prefix(UTF8_BOM).unwrap_or(&data);
				data.iter().all(u8::is_ascii_whitespace)
					|| serde_json::from_slice::<Value>(data).is_ok()
			}
			Err(e) => e.kind() == io::ErrorKind::NotFound && backup.is_none(),
		};

		if intact {
			return;
		}

		if let Some(backup) = backup {
			match fs::copy(backup, &self.path).await {
				Ok(_) => warn!(backup = %backup.display(), "Restored metadata document from backup"),
				Err(e) => error!(
					backup = %backup.display(),
					?e,
					"Failed to restore metadata document from backup"
				),
			}
		}
	}
}

fn decode_document(path: &Path, data: &[u8]) -> (Vec<GalleryEntry>, Vec<Value>) {
	let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);

	if data.iter().all(u8::is_ascii_whitespace) {
		info!("Metadata document is empty");
		return (Vec::new(), Vec::new());
	}

	let values = match serde_json::from_slice::<Value>(data) {
		Ok(Value::Array(values)) => values,
		Ok(_) => {
			error!(path = %path.display(), "Metadata document is not a list of entries, ignoring it");
			return (Vec::new(), Vec::new());
		}
		Err(e) => {
			error!(path = %path.display(), ?e, "Metadata document is malformed, ignoring it");
			return (Vec::new(), Vec::new());
		}
	};

	let mut entries = Vec::with_capacity(values.len());
	let mut unparsed = Vec::new();

	for (position, value) in values.into_iter().enumerate() {
		match GalleryEntry::deserialize(&value) {
			Ok(entry) => entries.push(entry),
			Err(e) => {
				warn!(position, ?e, "Keeping undecodable metadata entry as is");
				unparsed.push(value);
			}
		}
	}

	(entries, unparsed)
}

/// One element of the persisted list.
#[derive(Serialize)]
#[serde(untagged)]
enum Record<'a> {
	Entry(&'a GalleryEntry),
	Raw(&'a Value),
}

fn encode_document(
	entries: &[GalleryEntry],
	unparsed: &[Value],
) -> Result<Vec<u8>, serde_json::Error> {
	let records = entries
		.iter()
		.map(Record::Entry)
		.chain(unparsed.iter().map(Record::Raw))
		.collect::<Vec<_>>();

	let mut bytes = Vec::with_capacity(records.len() * 512);
	let mut serializer =
		Serializer::with_formatter(&mut bytes, PrettyFormatter::with_indent(b"    "));
	records.serialize(&mut serializer)?;

	Ok(bytes)
}

fn dedup(entries: Vec<GalleryEntry>) -> (Vec<GalleryEntry>, HashMap<String, usize>) {
	let mut index = HashMap::with_capacity(entries.len());
	let mut kept = Vec::with_capacity(entries.len());

	for entry in entries {
		if index.contains_key(&entry.logical_path) {
			warn!(
				logical_path = %entry.logical_path,
				"Dropping duplicate metadata entry, keeping the first one"
			);
			continue;
		}
		index.insert(entry.logical_path.clone(), kept.len());
		kept.push(entry);
	}

	(kept, index)
}

fn build_index(entries: &[GalleryEntry]) -> Result<HashMap<String, usize>, StoreError> {
	let mut index = HashMap::with_capacity(entries.len());

	for (idx, entry) in entries.iter().enumerate() {
		if index.insert(entry.logical_path.clone(), idx).is_some() {
			return Err(StoreError::DuplicateLogicalPath(entry.logical_path.clone()));
		}
	}

	Ok(index)
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
	let mut name = OsString::from(path.as_os_str());
	name.push(suffix);
	PathBuf::from(name)
}

async fn remove_leftover(path: &Path) {
	if let Err(e) = fs::remove_file(path).await {
		if e.kind() != io::ErrorKind::NotFound {
			warn!(path = %path.display(), ?e, "Failed to remove leftover temp file");
		}
	}
}
