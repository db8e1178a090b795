use gg_utils::path_to_slash;

use std::{
	fmt,
	path::{Path, PathBuf},
};

use serde::Serialize;

use super::ResolveError;

/// A repository independent, forward slash separated path such as
/// `gs-character/Alice/AliceGu1.webp`.
///
/// Construction guarantees the path stays below whatever root it is later joined to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct LogicalPath(String);

impl LogicalPath {
	pub fn new(raw: &str) -> Result<Self, ResolveError> {
		let unified = raw.replace('\\', "/");

		if unified.starts_with('/') {
			return Err(ResolveError::PathTraversal(raw.to_string()));
		}

		let mut segments = Vec::new();
		for segment in unified.split('/') {
			match segment {
				"" | "." => {}
				".." => return Err(ResolveError::PathTraversal(raw.to_string())),
				segment if segments.is_empty() && has_drive_prefix(segment) => {
					return Err(ResolveError::PathTraversal(raw.to_string()))
				}
				segment => segments.push(segment),
			}
		}

		if segments.is_empty() {
			return Err(ResolveError::PathTraversal(raw.to_string()));
		}

		Ok(Self(segments.join("/")))
	}

	/// Builds the logical path of `path` relative to a repository `root`.
	pub fn from_relative(root: &Path, path: &Path) -> Option<Self> {
		let relative = path.strip_prefix(root).ok()?;

		Self::new(&path_to_slash(relative).ok()?).ok()
	}

	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn segments(&self) -> impl Iterator<Item = &str> {
		self.0.split('/')
	}

	#[must_use]
	pub fn first_segment(&self) -> &str {
		self.segments().next().unwrap_or_default()
	}

	#[must_use]
	pub fn file_name(&self) -> &str {
		self.0.rsplit('/').next().unwrap_or_default()
	}

	/// Name of the folder directly holding the file, empty for top level files.
	#[must_use]
	pub fn parent_name(&self) -> &str {
		let mut segments = self.0.rsplit('/').skip(1);
		segments.next().unwrap_or_default()
	}

	#[must_use]
	pub fn to_physical(&self, root: &Path) -> PathBuf {
		self.segments().fold(root.to_path_buf(), |path, segment| path.join(segment))
	}
}

impl fmt::Display for LogicalPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl AsRef<str> for LogicalPath {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

fn has_drive_prefix(segment: &str) -> bool {
	let bytes = segment.as_bytes();
	bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
