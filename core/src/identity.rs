use std::fmt;

use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const NUMERIC_IDENTITY_LEN: usize = 10;
pub const ALPHANUMERIC_IDENTITY_LEN: usize = 20;

/// How many fresh candidates are drawn before giving up on finding an unused identity.
pub const MAX_GENERATION_ATTEMPTS: usize = 32;

/// The two identity shapes found in gallery documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
	/// 10 decimal digits, the first one non-zero.
	#[default]
	Numeric,
	/// 20 ASCII letters or digits.
	Alphanumeric,
}

impl IdentityKind {
	/// Classifies `candidate`, `None` when it matches neither shape.
	#[must_use]
	pub fn of(candidate: &str) -> Option<Self> {
		let bytes = candidate.as_bytes();

		if bytes.len() == NUMERIC_IDENTITY_LEN
			&& bytes.iter().all(u8::is_ascii_digit)
			&& bytes[0] != b'0'
		{
			Some(Self::Numeric)
		} else if bytes.len() == ALPHANUMERIC_IDENTITY_LEN
			&& bytes.iter().all(u8::is_ascii_alphanumeric)
		{
			Some(Self::Alphanumeric)
		} else {
			None
		}
	}
}

impl fmt::Display for IdentityKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Numeric => write!(f, "numeric"),
			Self::Alphanumeric => write!(f, "alphanumeric"),
		}
	}
}

#[derive(Debug, Error)]
pub enum IdentityError {
	#[error("no unused {kind} identity found after {attempts} attempts")]
	Exhausted { kind: IdentityKind, attempts: usize },
}

/// Checks length and character class, accepting both shapes.
#[must_use]
pub fn is_valid_identity(candidate: &str) -> bool {
	IdentityKind::of(candidate).is_some()
}

#[must_use]
pub fn generate(kind: IdentityKind) -> String {
	generate_with(&mut rand::thread_rng(), kind)
}

pub fn generate_with(rng: &mut impl Rng, kind: IdentityKind) -> String {
	match kind {
		IdentityKind::Numeric => {
			let mut identity = String::with_capacity(NUMERIC_IDENTITY_LEN);
			identity.push(char::from(b'0' + rng.gen_range(1..=9)));
			identity.extend(
				(1..NUMERIC_IDENTITY_LEN).map(|_| char::from(b'0' + rng.gen_range(0..=9))),
			);
			identity
		}
		IdentityKind::Alphanumeric => rng
			.sample_iter(&Alphanumeric)
			.take(ALPHANUMERIC_IDENTITY_LEN)
			.map(char::from)
			.collect(),
	}
}

/// Draws identities until one is not `is_taken`.
pub fn generate_unique(
	kind: IdentityKind,
	is_taken: impl Fn(&str) -> bool,
) -> Result<String, IdentityError> {
	let mut rng = rand::thread_rng();

	(0..MAX_GENERATION_ATTEMPTS)
		.map(|_| generate_with(&mut rng, kind))
		.find(|candidate| !is_taken(candidate))
		.ok_or(IdentityError::Exhausted {
			kind,
			attempts: MAX_GENERATION_ATTEMPTS,
		})
}

/// Keeps a caller supplied identity when it is well formed and unused, otherwise replaces it
/// with a freshly generated one.
pub fn sanitize(
	candidate: Option<&str>,
	kind: IdentityKind,
	is_taken: impl Fn(&str) -> bool,
) -> Result<String, IdentityError> {
	match candidate.map(str::trim) {
		Some(candidate) if is_valid_identity(candidate) && !is_taken(candidate) => {
			Ok(candidate.to_string())
		}
		Some(candidate) => {
			debug!(%candidate, "Discarding caller supplied identity");
			generate_unique(kind, is_taken)
		}
		None => generate_unique(kind, is_taken),
	}
}
