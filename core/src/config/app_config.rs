use crate::{calibration::DEFAULT_CANCEL_POLL_INTERVAL, identity::IdentityKind, resolver};

use std::{
	fs, io,
	path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::ConfigError;

pub const APP_CONFIG_FILE: &str = "gallery.json";

const CONFIG_VERSION: u32 = 2;

/// Settings of the app itself, stored as JSON in its data directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
	pub version: u32,

	/// Last primary root picked by the user.
	#[serde(default)]
	pub primary_root: Option<PathBuf>,

	#[serde(default = "default_log_level")]
	pub log_level: String,

	#[serde(default = "default_path_cache_capacity")]
	pub path_cache_capacity: u64,

	#[serde(default = "default_cancel_poll_interval")]
	pub cancel_poll_interval: usize,

	#[serde(default)]
	pub identity_kind: IdentityKind,
}

fn default_log_level() -> String {
	"info".to_string()
}

const fn default_path_cache_capacity() -> u64 {
	resolver::DEFAULT_CACHE_CAPACITY
}

const fn default_cancel_poll_interval() -> usize {
	DEFAULT_CANCEL_POLL_INTERVAL
}

impl Default for AppConfig {
	fn default() -> Self {
		Self {
			version: CONFIG_VERSION,
			primary_root: None,
			log_level: default_log_level(),
			path_cache_capacity: default_path_cache_capacity(),
			cancel_poll_interval: default_cancel_poll_interval(),
			identity_kind: IdentityKind::default(),
		}
	}
}

impl AppConfig {
	/// Loads the config in `data_dir`, creating it with defaults when absent and migrating
	/// older versions in place.
	pub fn load_or_create(data_dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = data_dir.as_ref().join(APP_CONFIG_FILE);

		let json = match fs::read_to_string(&path) {
			Ok(json) => json,
			Err(e) if e.kind() == io::ErrorKind::NotFound => {
				warn!(path = %path.display(), "No config found, creating default");
				let config = Self::default();
				config.save(data_dir)?;
				return Ok(config);
			}
			Err(source) => return Err(ConfigError::Io { path, source }),
		};

		let mut config = serde_json::from_str::<Self>(&json)
			.map_err(|source| ConfigError::Json {
				path: path.clone(),
				source,
			})?;

		if config.version < CONFIG_VERSION {
			info!(
				from = config.version,
				to = CONFIG_VERSION,
				"Migrating config"
			);
			config.migrate()?;
			config.save(data_dir)?;
		}

		Ok(config)
	}

	pub fn save(&self, data_dir: impl AsRef<Path>) -> Result<(), ConfigError> {
		let data_dir = data_dir.as_ref();
		fs::create_dir_all(data_dir).map_err(|source| ConfigError::Io {
			path: data_dir.to_path_buf(),
			source,
		})?;

		let path = data_dir.join(APP_CONFIG_FILE);
		let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Json {
			path: path.clone(),
			source,
		})?;

		fs::write(&path, json).map_err(|source| ConfigError::Io { path, source })
	}

	fn migrate(&mut self) -> Result<(), ConfigError> {
		match self.version {
			0 => {
				self.version = 1;
				self.migrate()
			}
			1 => {
				// v2 introduced the poll interval, older files may hold a zero from hand edits
				if self.cancel_poll_interval == 0 {
					self.cancel_poll_interval = default_cancel_poll_interval();
				}
				self.version = 2;
				Ok(())
			}
			CONFIG_VERSION => Ok(()),
			v => Err(ConfigError::UnknownVersion(v)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use pretty_assertions::assert_eq;
	use tempfile::tempdir;

	#[test]
	fn creates_defaults_then_reloads() {
		let dir = tempdir().unwrap();

		let created = AppConfig::load_or_create(dir.path()).unwrap();
		assert_eq!(created, AppConfig::default());
		assert!(dir.path().join(APP_CONFIG_FILE).is_file());

		let mut changed = created;
		changed.primary_root = Some(PathBuf::from("/plugins/Miao-Plugin-MBT"));
		changed.save(dir.path()).unwrap();

		assert_eq!(AppConfig::load_or_create(dir.path()).unwrap(), changed);
	}

	#[test]
	fn migrates_old_versions() {
		let dir = tempdir().unwrap();
		fs::write(
			dir.path().join(APP_CONFIG_FILE),
			r#"{ "version": 1, "cancel_poll_interval": 0 }"#,
		)
		.unwrap();

		let config = AppConfig::load_or_create(dir.path()).unwrap();
		assert_eq!(config.version, CONFIG_VERSION);
		assert_eq!(config.cancel_poll_interval, DEFAULT_CANCEL_POLL_INTERVAL);
		assert_eq!(config.path_cache_capacity, resolver::DEFAULT_CACHE_CAPACITY);
	}

	#[test]
	fn unknown_versions_are_not_migrated() {
		let dir = tempdir().unwrap();
		fs::write(dir.path().join(APP_CONFIG_FILE), r#"{ "version": 99 }"#).unwrap();

		// Newer files are read as is
		assert_eq!(AppConfig::load_or_create(dir.path()).unwrap().version, 99);

		let mut config = AppConfig {
			version: 7,
			..Default::default()
		};
		assert!(matches!(
			config.migrate(),
			Err(ConfigError::UnknownVersion(7))
		));
	}
}
