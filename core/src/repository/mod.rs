//! Discovery of the directory trees ("repositories") that together hold the gallery.
//!
//! The user picks a primary root such as `/plugins/Miao-Plugin-MBT`. Its siblings named
//! `<base>-<digits>` (`Miao-Plugin-MBT-2`, `Miao-Plugin-MBT-3`, ...) are shards of the same
//! dataset and are looked up after the primary, by ascending numeric suffix.

use crate::GALLERY_DATA_DIR;

use std::{
	io,
	path::{Path, PathBuf},
};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tokio::fs;
use tracing::{debug, instrument, trace, warn};

mod error;

pub use error::RepositoryError;

static NUMERIC_SUFFIX: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"^(?P<base>.+)-(?P<n>\d+)$").expect("static regex is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Repository {
	name: String,
	root: PathBuf,
}

impl Repository {
	#[must_use]
	pub fn name(&self) -> &str {
		&self.name
	}

	#[must_use]
	pub fn root(&self) -> &Path {
		&self.root
	}
}

/// The ordered repositories of one dataset. The primary is always first.
#[derive(Debug, Clone, Serialize)]
pub struct RepositorySet {
	repositories: Vec<Repository>,
	scan_warning: Option<String>,
}

impl RepositorySet {
	/// Builds the set from a user chosen primary root.
	///
	/// Only reads the filesystem. A failure to list the parent directory leaves a primary only
	/// set, with the reason available through [`RepositorySet::scan_warning`].
	#[instrument(skip_all, fields(primary_root = %primary_root.as_ref().display()), err)]
	pub async fn detect(primary_root: impl AsRef<Path>) -> Result<Self, RepositoryError> {
		let primary_root = primary_root.as_ref();

		let metadata = fs::metadata(primary_root).await.map_err(|e| {
			RepositoryError::invalid_root(
				primary_root,
				if e.kind() == io::ErrorKind::NotFound {
					"does not exist".to_string()
				} else {
					format!("not accessible: {e}")
				},
			)
		})?;
		if !metadata.is_dir() {
			return Err(RepositoryError::invalid_root(
				primary_root,
				"not a directory",
			));
		}

		let root = fs::canonicalize(primary_root)
			.await
			.map_err(|e| RepositoryError::invalid_root(primary_root, format!("{e}")))?;

		let name = root
			.file_name()
			.and_then(|name| name.to_str())
			.ok_or_else(|| {
				RepositoryError::invalid_root(&root, "directory name is missing or not UTF-8")
			})?
			.to_string();

		let base_name = NUMERIC_SUFFIX
			.captures(&name)
			.and_then(|captures| captures.name("base"))
			.map_or_else(|| name.clone(), |base| base.as_str().to_string());

		let mut repositories = vec![Repository {
			name: name.clone(),
			root: root.clone(),
		}];
		let mut scan_warning = None;

		if let Some(parent) = root.parent() {
			match scan_siblings(parent, &base_name, &name).await {
				Ok(siblings) => repositories.extend(siblings),
				Err(e) => {
					let message = format!(
						"failed to scan for sibling repositories in '{}': {e}",
						parent.display()
					);
					warn!("{message}");
					scan_warning = Some(message);
				}
			}
		}

		debug!(
			repositories = ?repositories.iter().map(Repository::name).collect::<Vec<_>>(),
			"Detected repository set"
		);

		Ok(Self {
			repositories,
			scan_warning,
		})
	}

	/// A set made of exactly the given repositories, in order. The first one is the primary.
	#[must_use]
	pub fn from_roots(roots: impl IntoIterator<Item = (String, PathBuf)>) -> Self {
		Self {
			repositories: roots
				.into_iter()
				.map(|(name, root)| Repository { name, root })
				.collect(),
			scan_warning: None,
		}
	}

	#[must_use]
	pub fn primary(&self) -> Option<&Repository> {
		self.repositories.first()
	}

	#[must_use]
	pub fn get(&self, name: &str) -> Option<&Repository> {
		self.repositories.iter().find(|repository| repository.name == name)
	}

	pub fn iter(&self) -> impl Iterator<Item = &Repository> {
		self.repositories.iter()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.repositories.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.repositories.is_empty()
	}

	#[must_use]
	pub fn scan_warning(&self) -> Option<&str> {
		self.scan_warning.as_deref()
	}

	/// Where the metadata document and gallery toggles live: `<primary>/GuGuNiu-Gallery`.
	#[must_use]
	pub fn data_dir(&self) -> Option<PathBuf> {
		self.primary()
			.map(|primary| primary.root.join(GALLERY_DATA_DIR))
	}
}

async fn scan_siblings(
	parent: &Path,
	base_name: &str,
	primary_name: &str,
) -> Result<Vec<Repository>, io::Error> {
	let mut siblings = Vec::new();
	let mut read_dir = fs::read_dir(parent).await?;

	while let Some(entry) = read_dir.next_entry().await? {
		let Some(name) = entry.file_name().to_str().map(str::to_string) else {
			continue;
		};
		if name == primary_name {
			continue;
		}

		let Some(suffix) = NUMERIC_SUFFIX
			.captures(&name)
			.filter(|captures| &captures["base"] == base_name)
			.map(|captures| captures["n"].parse::<u128>().unwrap_or(u128::MAX))
		else {
			continue;
		};

		let path = entry.path();
		// Following symlinks, a linked shard is still a shard
		match fs::metadata(&path).await {
			Ok(metadata) if metadata.is_dir() => siblings.push((suffix, name, path)),
			Ok(_) => trace!(path = %path.display(), "Skipping non directory sibling"),
			Err(e) => warn!(path = %path.display(), ?e, "Failed to stat sibling candidate"),
		}
	}

	siblings.sort_by(|(a_suffix, a_name, _), (b_suffix, b_name, _)| {
		a_suffix.cmp(b_suffix).then_with(|| a_name.cmp(b_name))
	});

	Ok(siblings
		.into_iter()
		.map(|(_, name, root)| Repository { name, root })
		.collect())
}

#[cfg(test)]
mod tests {
	use super::*;

	use pretty_assertions::assert_eq;
	use tempfile::tempdir;

	fn names(set: &RepositorySet) -> Vec<&str> {
		set.iter().map(Repository::name).collect()
	}

	#[tokio::test]
	async fn primary_first_then_siblings_by_suffix() {
		let dir = tempdir().unwrap();
		for name in [
			"Gallery",
			"Gallery-10",
			"Gallery-2",
			"Gallery-3",
			"Gallery-x",
			"Other-2",
		] {
			fs::create_dir(dir.path().join(name)).await.unwrap();
		}
		fs::write(dir.path().join("Gallery-4"), b"not a dir")
			.await
			.unwrap();

		let set = RepositorySet::detect(dir.path().join("Gallery"))
			.await
			.unwrap();

		assert_eq!(
			names(&set),
			vec!["Gallery", "Gallery-2", "Gallery-3", "Gallery-10"]
		);
		assert!(set.scan_warning().is_none());
		assert!(set.data_dir().unwrap().ends_with("Gallery/GuGuNiu-Gallery"));
	}

	#[tokio::test]
	async fn suffixed_primary_uses_stripped_base() {
		let dir = tempdir().unwrap();
		for name in ["Gallery-1", "Gallery-2"] {
			fs::create_dir(dir.path().join(name)).await.unwrap();
		}

		let set = RepositorySet::detect(dir.path().join("Gallery-2"))
			.await
			.unwrap();

		assert_eq!(names(&set), vec!["Gallery-2", "Gallery-1"]);
	}

	#[tokio::test]
	async fn invalid_roots_are_rejected() {
		let dir = tempdir().unwrap();
		let file = dir.path().join("file");
		fs::write(&file, b"").await.unwrap();

		assert!(matches!(
			RepositorySet::detect(dir.path().join("missing")).await,
			Err(RepositoryError::InvalidRoot { .. })
		));
		assert!(matches!(
			RepositorySet::detect(&file).await,
			Err(RepositoryError::InvalidRoot { .. })
		));
	}
}
