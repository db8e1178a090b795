//! Test helpers for integration tests

#![allow(dead_code)]

use gg_core::{
	config::EngineOptions, store::GalleryEntry, Gallery, GALLERY_DATA_DIR, IMAGE_DATA_FILE,
};

use std::path::{Path, PathBuf};

use serde_json::json;
use tempfile::TempDir;
use tokio::fs;

pub const PRIMARY: &str = "Miao-Plugin-MBT";
pub const SECOND: &str = "Miao-Plugin-MBT-2";
pub const THIRD: &str = "Miao-Plugin-MBT-3";

/// A primary repository with two siblings in a temp directory, plus an unrelated directory
/// that must never be picked up.
pub struct GalleryHarness {
	_dir: TempDir,
	pub parent: PathBuf,
}

impl GalleryHarness {
	pub async fn new() -> Self {
		let dir = TempDir::new().unwrap();
		let parent = fs::canonicalize(dir.path()).await.unwrap();

		for name in [PRIMARY, SECOND, THIRD, "Other-Plugin"] {
			fs::create_dir_all(parent.join(name)).await.unwrap();
		}

		Self { _dir: dir, parent }
	}

	pub fn root(&self, repository: &str) -> PathBuf {
		self.parent.join(repository)
	}

	pub fn document_path(&self) -> PathBuf {
		self.root(PRIMARY)
			.join(GALLERY_DATA_DIR)
			.join(IMAGE_DATA_FILE)
	}

	pub async fn write_image(&self, repository: &str, logical_path: &str, contents: &[u8]) {
		let path = self.root(repository).join(logical_path);
		fs::create_dir_all(path.parent().unwrap()).await.unwrap();
		fs::write(path, contents).await.unwrap();
	}

	pub async fn write_document(&self, entries: &[GalleryEntry]) {
		let path = self.document_path();
		fs::create_dir_all(path.parent().unwrap()).await.unwrap();
		fs::write(path, serde_json::to_vec_pretty(entries).unwrap())
			.await
			.unwrap();
	}

	pub async fn open(&self) -> Gallery {
		Gallery::open(self.root(PRIMARY), EngineOptions::default())
			.await
			.unwrap()
	}

	pub async fn backups(&self) -> usize {
		count_backups(self.document_path().parent().unwrap()).await
	}
}

pub async fn count_backups(dir: &Path) -> usize {
	let mut count = 0;
	let mut read_dir = fs::read_dir(dir).await.unwrap();
	while let Some(entry) = read_dir.next_entry().await.unwrap() {
		if entry.file_name().to_string_lossy().contains(".bak_") {
			count += 1;
		}
	}
	count
}

pub async fn file_names(dir: &Path) -> Vec<String> {
	let mut names = Vec::new();
	let mut read_dir = fs::read_dir(dir).await.unwrap();
	while let Some(entry) = read_dir.next_entry().await.unwrap() {
		names.push(entry.file_name().to_string_lossy().to_string());
	}
	names.sort();
	names
}

pub fn entry(identity: &str, logical_path: &str, owning_repository: Option<&str>) -> GalleryEntry {
	let group_name = logical_path.rsplit('/').nth(1).unwrap_or_default();
	let file_name = logical_path.rsplit('/').next().unwrap_or_default();

	serde_json::from_value(json!({
		"storagebox": owning_repository,
		"gid": identity,
		"characterName": group_name,
		"path": logical_path,
		"attributes": {
			"filename": file_name,
			"parentFolder": group_name,
			"isPx18": false,
			"isRx18": false,
			"layout": "normal",
			"isEasterEgg": false,
			"isAiImage": false,
			"isBan": false,
			"md5": "N/A",
			"Downloaded_From": "none"
		},
		"timestamp": "2024-05-01T10:00:00.000Z",
		"sourceGallery": "gs-character"
	}))
	.unwrap()
}
