//! Application configuration and the gallery's own toggles document.

use crate::{calibration::DEFAULT_CANCEL_POLL_INTERVAL, identity::IdentityKind, resolver};

use std::{io, path::PathBuf};

use thiserror::Error;

mod app_config;
mod gallery_config;

pub use app_config::{AppConfig, APP_CONFIG_FILE};
pub use gallery_config::{ensure_gallery_config, load_gallery_config, GalleryToggles};

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("could not determine a data directory for this platform")]
	NoDataDir,
	#[error("config I/O error <path='{}'>: {source}", .path.display())]
	Io { path: PathBuf, source: io::Error },
	#[error("invalid JSON config <path='{}'>: {source}", .path.display())]
	Json {
		path: PathBuf,
		source: serde_json::Error,
	},
	#[error("invalid YAML config <path='{}'>: {source}", .path.display())]
	Yaml {
		path: PathBuf,
		source: serde_yaml::Error,
	},
	#[error("unknown config version: {0}")]
	UnknownVersion(u32),
}

/// Platform specific directory for the app's own files.
pub fn default_data_dir() -> Result<PathBuf, ConfigError> {
	#[cfg(target_os = "linux")]
	let base = dirs::data_local_dir();

	#[cfg(not(target_os = "linux"))]
	let base = dirs::data_dir();

	base.map(|dir| dir.join("gugu-gallery"))
		.ok_or(ConfigError::NoDataDir)
}

/// Tunables of one engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
	pub path_cache_capacity: u64,
	/// Bulk operations check for cancellation once every this many items.
	pub cancel_poll_interval: usize,
	pub identity_kind: IdentityKind,
}

impl Default for EngineOptions {
	fn default() -> Self {
		Self {
			path_cache_capacity: resolver::DEFAULT_CACHE_CAPACITY,
			cancel_poll_interval: DEFAULT_CANCEL_POLL_INTERVAL,
			identity_kind: IdentityKind::default(),
		}
	}
}

impl From<&AppConfig> for EngineOptions {
	fn from(config: &AppConfig) -> Self {
		Self {
			path_cache_capacity: config.path_cache_capacity.max(1),
			cancel_poll_interval: config.cancel_poll_interval.max(1),
			identity_kind: config.identity_kind,
		}
	}
}
