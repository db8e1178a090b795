//! Maps logical paths to the physical file in whichever repository holds it.

use crate::repository::RepositorySet;

use std::{
	fmt, io,
	path::{Path, PathBuf},
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
	},
};

use mini_moka::sync::Cache;
use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tracing::{instrument, trace, warn};

mod logical_path;

pub use logical_path::LogicalPath;

pub const DEFAULT_CACHE_CAPACITY: u64 = 4096;

#[derive(Debug, Error)]
pub enum ResolveError {
	#[error("logical path escapes the repository root: <path='{0}'>")]
	PathTraversal(String),
	#[error("logical path not found in any repository: <path='{0}'>")]
	NotFound(String),
}

/// Where a logical path currently lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPath {
	pub repository: String,
	pub path: PathBuf,
}

/// Resolver with a bounded memo of positive lookups.
///
/// The memo belongs to the instance and is dropped wholesale whenever the repository set is
/// replaced. Hits are re-checked against the filesystem before being returned, but only for
/// existence: a file that later shows up in a higher priority repository doesn't win over a
/// cached hit until [`Self::invalidate`] runs. Operations that move or register files call it.
pub struct LogicalPathResolver {
	repositories: RwLock<Arc<RepositorySet>>,
	cache: Cache<LogicalPath, ResolvedPath>,
	generation: AtomicU64,
}

impl fmt::Debug for LogicalPathResolver {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LogicalPathResolver")
			.field("repositories", &self.repositories.read().len())
			.field("cached_entries", &self.cache.entry_count())
			.finish()
	}
}

impl LogicalPathResolver {
	#[must_use]
	pub fn new(repositories: Arc<RepositorySet>, cache_capacity: u64) -> Self {
		Self {
			repositories: RwLock::new(repositories),
			cache: Cache::new(cache_capacity),
			generation: AtomicU64::new(0),
		}
	}

	#[must_use]
	pub fn repositories(&self) -> Arc<RepositorySet> {
		Arc::clone(&self.repositories.read())
	}

	pub fn replace_repositories(&self, repositories: Arc<RepositorySet>) {
		let mut current = self.repositories.write();
		*current = repositories;
		self.generation.fetch_add(1, Ordering::AcqRel);
		self.cache.invalidate_all();
	}

	pub fn invalidate(&self) {
		self.generation.fetch_add(1, Ordering::AcqRel);
		self.cache.invalidate_all();
	}

	pub async fn resolve(
		&self,
		raw: &str,
		declared_repository: Option<&str>,
	) -> Result<ResolvedPath, ResolveError> {
		self.resolve_logical(&LogicalPath::new(raw)?, declared_repository)
			.await
	}

	/// Tries the declared repository first, then the memo, then every repository in order.
	#[instrument(skip(self), fields(logical_path = %logical_path), err(level = "trace"))]
	pub async fn resolve_logical(
		&self,
		logical_path: &LogicalPath,
		declared_repository: Option<&str>,
	) -> Result<ResolvedPath, ResolveError> {
		let (repositories, generation) = {
			let current = self.repositories.read();
			(Arc::clone(&current), self.generation.load(Ordering::Acquire))
		};

		let declared = declared_repository.and_then(|name| repositories.get(name));

		if let Some(repository) = declared {
			let path = logical_path.to_physical(repository.root());
			if is_file(&path).await {
				trace!(repository = repository.name(), "Resolved through declared repository");
				return Ok(ResolvedPath {
					repository: repository.name().to_string(),
					path,
				});
			}
		}

		if let Some(cached) = self.cache.get(logical_path) {
			if repositories.get(&cached.repository).is_some() && is_file(&cached.path).await {
				trace!(repository = %cached.repository, "Resolved from cache");
				return Ok(cached);
			}
			self.cache.invalidate(logical_path);
		}

		for repository in repositories.iter() {
			if declared.is_some_and(|declared| declared.name() == repository.name()) {
				continue;
			}

			let path = logical_path.to_physical(repository.root());
			if is_file(&path).await {
				let resolved = ResolvedPath {
					repository: repository.name().to_string(),
					path,
				};

				// A concurrent rebuild makes this result stale for the new set
				if self.generation.load(Ordering::Acquire) == generation {
					self.cache.insert(logical_path.clone(), resolved.clone());
				}

				return Ok(resolved);
			}
		}

		Err(ResolveError::NotFound(logical_path.to_string()))
	}
}

async fn is_file(path: &Path) -> bool {
	match fs::metadata(path).await {
		Ok(metadata) => metadata.is_file(),
		Err(e) if e.kind() == io::ErrorKind::NotFound => false,
		Err(e) => {
			warn!(path = %path.display(), ?e, "Failed to stat candidate file");
			false
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use tempfile::{tempdir, TempDir};

	struct Fixture {
		_dir: TempDir,
		primary: PathBuf,
		sibling: PathBuf,
		resolver: LogicalPathResolver,
	}

	async fn fixture() -> Fixture {
		let dir = tempdir().unwrap();
		let primary = dir.path().join("Gallery");
		let sibling = dir.path().join("Gallery-2");
		for root in [&primary, &sibling] {
			fs::create_dir_all(root.join("gs-character/Alice"))
				.await
				.unwrap();
		}

		let resolver = LogicalPathResolver::new(
			Arc::new(RepositorySet::from_roots([
				("Gallery".to_string(), primary.clone()),
				("Gallery-2".to_string(), sibling.clone()),
			])),
			DEFAULT_CACHE_CAPACITY,
		);

		Fixture {
			_dir: dir,
			primary,
			sibling,
			resolver,
		}
	}

	#[tokio::test]
	async fn resolves_iff_file_exists() {
		let fixture = fixture().await;
		let logical = "gs-character/Alice/AliceGu1.webp";

		assert!(matches!(
			fixture.resolver.resolve(logical, None).await,
			Err(ResolveError::NotFound(_))
		));

		let physical = fixture.sibling.join(logical);
		fs::write(&physical, b"img").await.unwrap();

		let resolved = fixture.resolver.resolve(logical, None).await.unwrap();
		assert_eq!(resolved.repository, "Gallery-2");
		assert_eq!(resolved.path, physical);

		// Cached hits are re-validated
		fs::remove_file(&physical).await.unwrap();
		assert!(matches!(
			fixture.resolver.resolve(logical, None).await,
			Err(ResolveError::NotFound(_))
		));
	}

	#[tokio::test]
	async fn primary_wins_and_declared_repository_is_tried_first() {
		let fixture = fixture().await;
		let logical = "gs-character/Alice/AliceGu1.webp";
		fs::write(fixture.primary.join(logical), b"a").await.unwrap();
		fs::write(fixture.sibling.join(logical), b"b").await.unwrap();

		assert_eq!(
			fixture.resolver.resolve(logical, None).await.unwrap().repository,
			"Gallery"
		);
		assert_eq!(
			fixture
				.resolver
				.resolve(logical, Some("Gallery-2"))
				.await
				.unwrap()
				.repository,
			"Gallery-2"
		);
		// An unknown or stale declaration falls back to the ordered scan
		assert_eq!(
			fixture
				.resolver
				.resolve(logical, Some("Gallery-9"))
				.await
				.unwrap()
				.repository,
			"Gallery"
		);
	}

	#[tokio::test]
	async fn backslashes_and_traversal() {
		let fixture = fixture().await;
		fs::write(
			fixture.primary.join("gs-character/Alice/AliceGu1.webp"),
			b"a",
		)
		.await
		.unwrap();

		assert!(fixture
			.resolver
			.resolve(r"gs-character\Alice\AliceGu1.webp", None)
			.await
			.is_ok());
		assert!(matches!(
			fixture
				.resolver
				.resolve("gs-character/Alice/../../../etc/passwd", None)
				.await,
			Err(ResolveError::PathTraversal(_))
		));
	}

	#[tokio::test]
	async fn cached_hit_holds_until_invalidated() {
		let fixture = fixture().await;
		let logical = "gs-character/Alice/AliceGu1.webp";
		fs::write(fixture.sibling.join(logical), b"b").await.unwrap();

		assert_eq!(
			fixture.resolver.resolve(logical, None).await.unwrap().repository,
			"Gallery-2"
		);

		fs::write(fixture.primary.join(logical), b"a").await.unwrap();
		assert_eq!(
			fixture.resolver.resolve(logical, None).await.unwrap().repository,
			"Gallery-2"
		);

		fixture.resolver.invalidate();
		assert_eq!(
			fixture.resolver.resolve(logical, None).await.unwrap().repository,
			"Gallery"
		);
	}

	#[tokio::test]
	async fn replacing_repositories_drops_cache() {
		let fixture = fixture().await;
		let logical = "gs-character/Alice/AliceGu1.webp";
		fs::write(fixture.sibling.join(logical), b"b").await.unwrap();

		assert!(fixture.resolver.resolve(logical, None).await.is_ok());

		fixture
			.resolver
			.replace_repositories(Arc::new(RepositorySet::from_roots([(
				"Gallery".to_string(),
				fixture.primary.clone(),
			)])));

		assert!(matches!(
			fixture.resolver.resolve(logical, None).await,
			Err(ResolveError::NotFound(_))
		));
	}
}
