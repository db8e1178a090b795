use crate::GALLERY_CONFIG_FILE;

use std::path::Path;

use serde_yaml::{Mapping, Value};
use tokio::{fs, io};
use tracing::{debug, info, instrument};

use super::ConfigError;

/// The gallery's small YAML toggles document, kept as a plain mapping since only other tools
/// interpret its keys.
pub type GalleryToggles = Mapping;

const DEFAULT_TOGGLES: [(&str, u64); 4] = [
	("GGOP", 1),
	("Px18img-type", 0),
	("Rx18img-type", 0),
	("MihoyoOption", 0),
];

fn default_toggles() -> GalleryToggles {
	DEFAULT_TOGGLES
		.into_iter()
		.map(|(key, value)| (Value::from(key), Value::from(value)))
		.collect()
}

/// Writes the toggles document with its defaults when the data directory has none. An
/// existing document is never rewritten. Returns whether a document was created.
#[instrument(skip_all, fields(data_dir = %data_dir.as_ref().display()), err)]
pub async fn ensure_gallery_config(data_dir: impl AsRef<Path>) -> Result<bool, ConfigError> {
	let data_dir = data_dir.as_ref();
	let path = data_dir.join(GALLERY_CONFIG_FILE);

	match fs::metadata(&path).await {
		Ok(_) => {
			debug!("Gallery config already present");
			return Ok(false);
		}
		Err(e) if e.kind() == io::ErrorKind::NotFound => {}
		Err(source) => return Err(ConfigError::Io { path, source }),
	}

	fs::create_dir_all(data_dir)
		.await
		.map_err(|source| ConfigError::Io {
			path: data_dir.to_path_buf(),
			source,
		})?;

	let yaml = serde_yaml::to_string(&default_toggles()).map_err(|source| ConfigError::Yaml {
		path: path.clone(),
		source,
	})?;

	fs::write(&path, yaml)
		.await
		.map_err(|source| ConfigError::Io {
			path: path.clone(),
			source,
		})?;

	info!(path = %path.display(), "Created gallery config with defaults");

	Ok(true)
}

/// Reads the toggles document, an absent one reads as empty.
pub async fn load_gallery_config(data_dir: impl AsRef<Path>) -> Result<GalleryToggles, ConfigError> {
	let path = data_dir.as_ref().join(GALLERY_CONFIG_FILE);

	let yaml = match fs::read_to_string(&path).await {
		Ok(yaml) => yaml,
		Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Mapping::new()),
		Err(source) => return Err(ConfigError::Io { path, source }),
	};

	if yaml.trim().is_empty() {
		return Ok(Mapping::new());
	}

	serde_yaml::from_str(&yaml).map_err(|source| ConfigError::Yaml { path, source })
}
