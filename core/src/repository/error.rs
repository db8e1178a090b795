use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
	#[error("invalid primary root <path='{}'>: {reason}", .path.display())]
	InvalidRoot { path: Box<Path>, reason: String },
	#[error("repository set has no primary root")]
	NoPrimary,
}

impl RepositoryError {
	pub(super) fn invalid_root(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
		Self::InvalidRoot {
			path: path.as_ref().into(),
			reason: reason.into(),
		}
	}
}
