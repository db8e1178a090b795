use crate::{Error, NonCriticalError, GALLERY_DATA_DIR};

use gg_task_system::Interrupter;

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::trace;

pub const ALLOWED_EXTENSIONS: [&str; 5] = ["webp", "png", "jpg", "jpeg", "gif"];

#[must_use]
pub fn has_allowed_extension(path: &Path) -> bool {
	path.extension()
		.and_then(|extension| extension.to_str())
		.is_some_and(|extension| {
			ALLOWED_EXTENSIONS
				.iter()
				.any(|allowed| extension.eq_ignore_ascii_case(allowed))
		})
}

/// Regular image files found below `root`, with the problems met on the way.
///
/// Hidden directories and the gallery data directory are not entered, symlinks are not
/// followed. Cancellation is checked once per directory.
pub(crate) async fn walk_images(
	root: &Path,
	interrupter: &Interrupter,
) -> Result<(Vec<PathBuf>, Vec<NonCriticalError>), Error> {
	let mut images = Vec::new();
	let mut errors = Vec::new();
	let mut to_walk = vec![root.to_path_buf()];

	while let Some(dir) = to_walk.pop() {
		if interrupter.try_check_interrupt().is_some() {
			return Err(Error::Canceled);
		}

		let mut read_dir = match fs::read_dir(&dir).await {
			Ok(read_dir) => read_dir,
			Err(e) => {
				errors.push(NonCriticalError::Walk(format!(
					"failed to read directory '{}': {e}",
					dir.display()
				)));
				continue;
			}
		};

		loop {
			let entry = match read_dir.next_entry().await {
				Ok(Some(entry)) => entry,
				Ok(None) => break,
				Err(e) => {
					errors.push(NonCriticalError::Walk(format!(
						"failed to read entry in '{}': {e}",
						dir.display()
					)));
					break;
				}
			};

			let path = entry.path();
			let file_type = match entry.file_type().await {
				Ok(file_type) => file_type,
				Err(e) => {
					errors.push(NonCriticalError::Walk(format!(
						"failed to get file type of '{}': {e}",
						path.display()
					)));
					continue;
				}
			};

			if file_type.is_dir() {
				let name = entry.file_name();
				let name = name.to_string_lossy();
				if name.starts_with('.') || name == GALLERY_DATA_DIR {
					trace!(path = %path.display(), "Skipping directory");
					continue;
				}
				to_walk.push(path);
			} else if file_type.is_file() && has_allowed_extension(&path) {
				images.push(path);
			}
		}
	}

	images.sort();

	Ok((images, errors))
}
