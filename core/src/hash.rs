use gg_utils::error::FileIOError;

use std::path::Path;

use md5::{Digest, Md5};
use tokio::{fs::File, io::AsyncReadExt};

const BLOCK_LEN: usize = 64 * 1024;

/// Streams the file through MD5 and returns the lowercase hex digest.
pub async fn file_checksum(path: impl AsRef<Path>) -> Result<String, FileIOError> {
	let path = path.as_ref();

	let mut reader = File::open(path)
		.await
		.map_err(|e| FileIOError::from((path, e, "Failed to open file to checksum")))?;
	let mut context = Md5::new();
	let mut buffer = vec![0; BLOCK_LEN].into_boxed_slice();

	loop {
		let read_count = reader
			.read(&mut buffer)
			.await
			.map_err(|e| FileIOError::from((path, e, "Failed to read file to checksum")))?;
		if read_count == 0 {
			break;
		}
		context.update(&buffer[..read_count]);
	}

	Ok(hex::encode(context.finalize()))
}

#[cfg(test)]
mod tests {
	use super::*;

	use tempfile::tempdir;

	#[tokio::test]
	async fn known_digests() {
		let dir = tempdir().unwrap();

		let empty = dir.path().join("empty.webp");
		tokio::fs::write(&empty, b"").await.unwrap();
		assert_eq!(
			file_checksum(&empty).await.unwrap(),
			"d41d8cd98f00b204e9800998ecf8427e"
		);

		let hello = dir.path().join("hello.webp");
		tokio::fs::write(&hello, b"hello world").await.unwrap();
		assert_eq!(
			file_checksum(&hello).await.unwrap(),
			"5eb63bbbe01eeed093cb22bb8f5acdc3"
		);
	}

	#[tokio::test]
	async fn multi_block_file_matches_one_shot_digest() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("big.png");

		let data = (0..(BLOCK_LEN * 3 + 17))
			.map(|i| (i % 251) as u8)
			.collect::<Vec<_>>();
		tokio::fs::write(&path, &data).await.unwrap();

		assert_eq!(
			file_checksum(&path).await.unwrap(),
			hex::encode(Md5::digest(&data))
		);
	}

	#[tokio::test]
	async fn missing_file_error_carries_path() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("nope.jpg");

		let err = file_checksum(&path).await.unwrap_err();
		assert!(err.is_not_found());
		assert_eq!(&*err.path, path.as_path());
	}
}
