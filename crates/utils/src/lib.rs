#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

use std::path::{Component, Path};

pub mod error;

use error::NonUtf8PathError;

/// Renders a relative path with `/` separators regardless of the host platform.
///
/// Only normal components are kept, so `./a/b` and `a\b` (on Windows) both become `a/b`.
pub fn path_to_slash(path: impl AsRef<Path>) -> Result<String, NonUtf8PathError> {
	let path = path.as_ref();

	path.components()
		.filter_map(|component| match component {
			Component::Normal(part) => Some(
				part.to_str()
					.ok_or_else(|| NonUtf8PathError(path.into())),
			),
			_ => None,
		})
		.collect::<Result<Vec<_>, _>>()
		.map(|parts| parts.join("/"))
}

#[cfg(test)]
mod tests {
	use super::*;

	use std::path::PathBuf;

	use pretty_assertions::assert_eq;

	#[test]
	fn slash_rendering_drops_cur_dir() {
		let path = PathBuf::from(".").join("gs-character").join("Alice").join("AliceGu1.webp");

		assert_eq!(
			path_to_slash(path).expect("utf-8 path"),
			"gs-character/Alice/AliceGu1.webp"
		);
	}

	#[test]
	fn empty_path_renders_empty() {
		assert_eq!(path_to_slash("").expect("utf-8 path"), "");
	}
}
