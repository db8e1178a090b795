use std::{io, path::Path};

use thiserror::Error;

/// An I/O failure tied to the file or directory it happened on.
///
/// Built from `(path, io::Error)` or `(path, io::Error, "what we were doing")` tuples, so call
/// sites read `.map_err(|e| FileIOError::from((path, e, "Failed to open file")))`.
#[derive(Debug, Error)]
#[error("file I/O error{}: {source}; path: '{}'", .context.map(|ctx| format!(" ({ctx})")).unwrap_or_default(), .path.display())]
pub struct FileIOError {
	pub path: Box<Path>,
	#[source]
	pub source: io::Error,
	pub context: Option<&'static str>,
}

impl FileIOError {
	/// Whether the underlying I/O error means the path simply isn't there.
	#[must_use]
	pub fn is_not_found(&self) -> bool {
		self.source.kind() == io::ErrorKind::NotFound
	}
}

impl<P: AsRef<Path>> From<(P, io::Error)> for FileIOError {
	fn from((path, source): (P, io::Error)) -> Self {
		Self {
			path: path.as_ref().into(),
			source,
			context: None,
		}
	}
}

impl<P: AsRef<Path>> From<(P, io::Error, &'static str)> for FileIOError {
	fn from((path, source, context): (P, io::Error, &'static str)) -> Self {
		Self {
			path: path.as_ref().into(),
			source,
			context: Some(context),
		}
	}
}

/// A path that can't be rendered as UTF-8, so it has no logical path.
#[derive(Debug, Error)]
#[error("received a non UTF-8 path: <path='{}'>", .0.display())]
pub struct NonUtf8PathError(pub Box<Path>);

#[cfg(test)]
mod tests {
	use super::*;

	use pretty_assertions::assert_eq;

	#[test]
	fn message_carries_context_and_path() {
		let err = FileIOError::from((
			"gs-character/Alice/AliceGu1.webp",
			io::Error::from(io::ErrorKind::NotFound),
			"Failed to open file",
		));

		assert!(err.is_not_found());
		assert_eq!(
			err.to_string(),
			format!(
				"file I/O error (Failed to open file): {}; path: 'gs-character/Alice/AliceGu1.webp'",
				io::Error::from(io::ErrorKind::NotFound)
			)
		);
	}
}
