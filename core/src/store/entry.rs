use crate::resolver::{LogicalPath, ResolveError};

use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One managed image, persisted with the key names the gallery tooling has always used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryEntry {
	/// Repository believed to hold the file. May be absent or stale.
	#[serde(
		rename = "storagebox",
		alias = "owningRepository",
		default,
		skip_serializing_if = "Option::is_none"
	)]
	pub owning_repository: Option<String>,

	#[serde(
		rename = "gid",
		alias = "identity",
		default,
		deserialize_with = "string_or_number",
		skip_serializing_if = "Option::is_none"
	)]
	pub identity: Option<String>,

	#[serde(rename = "characterName", alias = "groupName", default)]
	pub group_name: String,

	/// Natural key of the store, always forward slash separated.
	#[serde(
		rename = "path",
		alias = "logicalPath",
		deserialize_with = "forward_slashes"
	)]
	pub logical_path: String,

	#[serde(default)]
	pub attributes: EntryAttributes,

	#[serde(
		rename = "timestamp",
		alias = "lastModified",
		default,
		skip_serializing_if = "Option::is_none"
	)]
	pub last_modified: Option<String>,

	#[serde(
		rename = "sourceGallery",
		default,
		skip_serializing_if = "Option::is_none"
	)]
	pub source_gallery: Option<String>,

	/// Keys this version doesn't know about, written back untouched.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl GalleryEntry {
	pub fn logical_path(&self) -> Result<LogicalPath, ResolveError> {
		LogicalPath::new(&self.logical_path)
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryAttributes {
	#[serde(default)]
	pub filename: String,
	#[serde(rename = "parentFolder", default)]
	pub parent_folder: String,
	#[serde(rename = "isPx18", default)]
	pub is_px18: bool,
	#[serde(rename = "isRx18", default)]
	pub is_rx18: bool,
	#[serde(default)]
	pub layout: Layout,
	#[serde(rename = "isEasterEgg", default)]
	pub is_easter_egg: bool,
	#[serde(rename = "isAiImage", default)]
	pub is_ai_image: bool,
	#[serde(rename = "isBan", default)]
	pub is_ban: bool,
	/// Lowercase hex MD5 of the file contents, `N/A` in some older documents.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub md5: Option<String>,
	/// Free text provenance.
	#[serde(
		rename = "Downloaded_From",
		default,
		skip_serializing_if = "Option::is_none"
	)]
	pub downloaded_from: Option<String>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl EntryAttributes {
	/// The recorded digest, unless missing or a placeholder.
	#[must_use]
	pub fn recorded_md5(&self) -> Option<&str> {
		self.md5
			.as_deref()
			.map(str::trim)
			.filter(|md5| !md5.is_empty() && !md5.eq_ignore_ascii_case("N/A"))
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Layout {
	#[default]
	Normal,
	Fullscreen,
	/// Anything else is preserved verbatim.
	Other(String),
}

impl From<String> for Layout {
	fn from(layout: String) -> Self {
		match layout.as_str() {
			"normal" => Self::Normal,
			"fullscreen" => Self::Fullscreen,
			_ => Self::Other(layout),
		}
	}
}

impl From<Layout> for String {
	fn from(layout: Layout) -> Self {
		match layout {
			Layout::Normal => "normal".to_string(),
			Layout::Fullscreen => "fullscreen".to_string(),
			Layout::Other(layout) => layout,
		}
	}
}

impl fmt::Display for Layout {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Normal => f.write_str("normal"),
			Self::Fullscreen => f.write_str("fullscreen"),
			Self::Other(layout) => f.write_str(layout),
		}
	}
}

fn forward_slashes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
	String::deserialize(deserializer).map(|path| path.replace('\\', "/"))
}

/// Older documents sometimes hold numeric ids as JSON numbers.
fn string_or_number<'de, D: Deserializer<'de>>(
	deserializer: D,
) -> Result<Option<String>, D::Error> {
	match Option::<Value>::deserialize(deserializer)? {
		None | Some(Value::Null) => Ok(None),
		Some(Value::String(identity)) => Ok(Some(identity)),
		Some(Value::Number(identity)) => Ok(Some(identity.to_string())),
		Some(other) => Err(de::Error::invalid_type(
			de::Unexpected::Other(&other.to_string()),
			&"a string or number identity",
		)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use pretty_assertions::assert_eq;
	use serde_json::json;

	#[test]
	fn reads_persisted_keys_and_keeps_unknown_ones() {
		let raw = json!({
			"storagebox": "Miao-Plugin-MBT-2",
			"gid": "1234567890",
			"characterName": "Alice",
			"path": "gs-character\\Alice\\AliceGu1.webp",
			"attributes": {
				"filename": "AliceGu1.webp",
				"parentFolder": "Alice",
				"isPx18": true,
				"isRx18": false,
				"layout": "fullscreen",
				"isEasterEgg": false,
				"isAiImage": true,
				"isBan": false,
				"md5": "5eb63bbbe01eeed093cb22bb8f5acdc3",
				"Downloaded_From": "none",
				"customFlag": 7
			},
			"timestamp": "2024-05-01T10:00:00.000Z",
			"sourceGallery": "gs-character",
			"note": "kept"
		});

		let entry: GalleryEntry = serde_json::from_value(raw.clone()).unwrap();

		assert_eq!(entry.owning_repository.as_deref(), Some("Miao-Plugin-MBT-2"));
		assert_eq!(entry.logical_path, "gs-character/Alice/AliceGu1.webp");
		assert_eq!(entry.attributes.layout, Layout::Fullscreen);
		assert!(entry.attributes.is_px18);
		assert_eq!(entry.extra.get("note"), Some(&json!("kept")));
		assert_eq!(entry.attributes.extra.get("customFlag"), Some(&json!(7)));

		let mut expected = raw;
		expected["path"] = json!("gs-character/Alice/AliceGu1.webp");
		assert_eq!(serde_json::to_value(&entry).unwrap(), expected);
	}

	#[test]
	fn accepts_model_names_and_sparse_entries() {
		let entry: GalleryEntry = serde_json::from_value(json!({
			"owningRepository": null,
			"identity": 1_234_567_890_u64,
			"groupName": "Bob",
			"logicalPath": "gs-character/Bob/BobGu1.webp",
			"attributes": { "layout": "portrait-wide" }
		}))
		.unwrap();

		assert_eq!(entry.owning_repository, None);
		assert_eq!(entry.identity.as_deref(), Some("1234567890"));
		assert_eq!(entry.group_name, "Bob");
		assert_eq!(
			entry.attributes.layout,
			Layout::Other("portrait-wide".to_string())
		);
		assert!(!entry.attributes.is_ban);
		assert_eq!(entry.last_modified, None);
	}

	#[test]
	fn placeholder_digests_are_not_recorded() {
		let mut attributes = EntryAttributes::default();
		assert_eq!(attributes.recorded_md5(), None);

		attributes.md5 = Some("N/A".to_string());
		assert_eq!(attributes.recorded_md5(), None);

		attributes.md5 = Some("ABC".to_string());
		assert_eq!(attributes.recorded_md5(), Some("ABC"));
	}
}
