use std::{cmp::Ordering, collections::BTreeMap, iter::Peekable, path::Path, str::Chars};

use once_cell::sync::Lazy;
use regex::Regex;

use super::{RenameOp, SequenceIssue};

static SEQUENCE_NAME: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"(?i)Gu(\d+)\.\w+$").expect("static regex is valid"));

/// A file taking part in its folder's numbering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct SequenceFile {
	pub name: String,
	pub number: u64,
}

impl SequenceFile {
	pub fn parse(name: &str) -> Option<Self> {
		let number = SEQUENCE_NAME
			.captures(name)
			.and_then(|captures| captures[1].parse().ok())?;

		Some(Self {
			name: name.to_string(),
			number,
		})
	}
}

/// Case folded comparison where digit runs compare by value, so `Gu2` sorts before `Gu10`.
/// Ties are broken on the raw names to keep the order total.
pub fn collate(a: &str, b: &str) -> Ordering {
	folded_cmp(a, b).then_with(|| a.cmp(b))
}

fn folded_cmp(a: &str, b: &str) -> Ordering {
	let (a, b) = (a.to_lowercase(), b.to_lowercase());
	let (mut a, mut b) = (a.chars().peekable(), b.chars().peekable());

	loop {
		match (a.peek().copied(), b.peek().copied()) {
			(None, None) => return Ordering::Equal,
			(None, Some(_)) => return Ordering::Less,
			(Some(_), None) => return Ordering::Greater,
			(Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
				let ordering = cmp_digit_runs(&take_digits(&mut a), &take_digits(&mut b));
				if ordering != Ordering::Equal {
					return ordering;
				}
			}
			(Some(x), Some(y)) => {
				if x != y {
					return x.cmp(&y);
				}
				a.next();
				b.next();
			}
		}
	}
}

fn take_digits(chars: &mut Peekable<Chars<'_>>) -> String {
	let mut digits = String::new();
	while let Some(digit) = chars.next_if(char::is_ascii_digit) {
		digits.push(digit);
	}
	digits
}

fn cmp_digit_runs(a: &str, b: &str) -> Ordering {
	let (a, b) = (a.trim_start_matches('0'), b.trim_start_matches('0'));
	a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Issues of one folder's numbering. Gaps are only looked at when there are no duplicates.
pub(super) fn detect_issues(files: &[SequenceFile]) -> Vec<SequenceIssue> {
	let mut by_number = BTreeMap::<u64, Vec<&str>>::new();
	for file in files {
		by_number.entry(file.number).or_default().push(&file.name);
	}

	let mut issues = by_number
		.iter()
		.filter(|(_, names)| names.len() > 1)
		.map(|(&number, names)| {
			let mut files = names.iter().map(ToString::to_string).collect::<Vec<_>>();
			files.sort_by(|a, b| collate(a, b));
			SequenceIssue::Duplicate { number, files }
		})
		.collect::<Vec<_>>();

	let has_duplicates = !issues.is_empty();

	if let Some(&lowest) = by_number.keys().next() {
		if lowest != 1 {
			issues.push(SequenceIssue::DoesNotStartAtOne { lowest });
		}
	}

	if !has_duplicates {
		let numbers = by_number.keys().copied().collect::<Vec<_>>();
		issues.extend(numbers.windows(2).filter_map(|pair| {
			(pair[1] > pair[0] + 1).then(|| SequenceIssue::Gap {
				from: pair[0] + 1,
				to: pair[1] - 1,
			})
		}));
	}

	issues
}

/// Duplicates whose names can't be told apart once case and zero padding are ignored have
/// no meaningful order, those folders are left for a human.
pub(super) fn needs_manual_resolution(files: &[SequenceFile]) -> bool {
	files.iter().enumerate().any(|(idx, file)| {
		files[idx + 1..].iter().any(|other| {
			other.number == file.number && folded_cmp(&other.name, &file.name) == Ordering::Equal
		})
	})
}

/// Renumbers the folder's files 1..n in collation order, keeping only actual renames.
pub(super) fn plan_renames(folder_name: &str, files: &[SequenceFile]) -> Vec<RenameOp> {
	let mut sorted = files.iter().collect::<Vec<_>>();
	sorted.sort_by(|a, b| collate(&a.name, &b.name));

	sorted
		.into_iter()
		.zip(1..)
		.filter_map(|(file, number): (&SequenceFile, u64)| {
			let extension = Path::new(&file.name)
				.extension()
				.and_then(|extension| extension.to_str())
				.map(|extension| format!(".{extension}"))
				.unwrap_or_default();
			let target = format!("{folder_name}Gu{number}{extension}");

			(target != file.name).then(|| RenameOp {
				from: file.name.clone(),
				to: target,
			})
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	use pretty_assertions::assert_eq;

	fn files(names: &[&str]) -> Vec<SequenceFile> {
		names
			.iter()
			.map(|name| SequenceFile::parse(name).unwrap())
			.collect()
	}

	#[test]
	fn parses_sequence_numbers() {
		assert_eq!(SequenceFile::parse("AliceGu12.webp").unwrap().number, 12);
		assert_eq!(SequenceFile::parse("alicegu3.PNG").unwrap().number, 3);
		assert!(SequenceFile::parse("Alice12.webp").is_none());
		assert!(SequenceFile::parse("AliceGu.webp").is_none());
	}

	#[test]
	fn collation_is_case_folded_and_numeric() {
		let mut names = vec!["AliceGu10.webp", "aliceGu2.webp", "AliceGu1.webp", "AliceGu2.webp"];
		names.sort_by(|a, b| collate(a, b));
		assert_eq!(
			names,
			vec!["AliceGu1.webp", "AliceGu2.webp", "aliceGu2.webp", "AliceGu10.webp"]
		);
	}

	#[test]
	fn gap_is_reported_only_without_duplicates() {
		assert_eq!(
			detect_issues(&files(&["AliceGu1.webp", "AliceGu3.webp", "AliceGu4.webp"])),
			vec![SequenceIssue::Gap { from: 2, to: 2 }]
		);

		assert_eq!(
			detect_issues(&files(&["AliceGu2.webp", "AliceGu2.png", "AliceGu5.webp"])),
			vec![
				SequenceIssue::Duplicate {
					number: 2,
					files: vec!["AliceGu2.png".to_string(), "AliceGu2.webp".to_string()],
				},
				SequenceIssue::DoesNotStartAtOne { lowest: 2 },
			]
		);

		assert!(detect_issues(&files(&["AliceGu1.webp", "AliceGu2.webp"])).is_empty());
	}

	#[test]
	fn alice_gap_plan() {
		assert_eq!(
			plan_renames(
				"Alice",
				&files(&["AliceGu4.webp", "AliceGu1.webp", "AliceGu3.webp"])
			),
			vec![
				RenameOp {
					from: "AliceGu3.webp".to_string(),
					to: "AliceGu2.webp".to_string(),
				},
				RenameOp {
					from: "AliceGu4.webp".to_string(),
					to: "AliceGu3.webp".to_string(),
				},
			]
		);
	}

	#[test]
	fn indistinguishable_duplicates_need_a_human() {
		assert!(needs_manual_resolution(&files(&[
			"AliceGu1.webp",
			"aliceGu1.webp"
		])));
		assert!(needs_manual_resolution(&files(&[
			"AliceGu01.webp",
			"AliceGu1.webp"
		])));
		assert!(!needs_manual_resolution(&files(&[
			"AliceGu1.webp",
			"AliceGu1.png"
		])));
	}
}
