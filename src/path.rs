//! Path splitting and validation.
//!
//! Grounded on the teacher's `file::path::Path::from_str`: split on `/`,
//! discard empty components (so `//a//b/` and `/a/b` are equivalent),
//! reject components that would not fit a directory entry's name field.
//! Generalized from the teacher's fallible-allocation `Vec<String>` to a
//! plain `Vec<&str>` since BVFS targets the ordinary (infallible
//! allocation) standard library rather than a `no_std` kernel.

use crate::block::codec::NAME_MAX;
use crate::error::BvfsError;

/// Splits an absolute, `/`-separated path into its non-empty segments.
///
/// Returns [`BvfsError::InvalidPath`] if the path is not absolute or any
/// segment exceeds [`NAME_MAX`] bytes.
pub fn split(path: &str) -> Result<Vec<&str>, BvfsError> {
	if !path.starts_with('/') {
		return Err(BvfsError::InvalidPath(path.to_string()));
	}
	let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
	for seg in &segments {
		if seg.len() > NAME_MAX {
			return Err(BvfsError::InvalidPath(path.to_string()));
		}
	}
	Ok(segments)
}

/// Splits a path into its parent directory path and its leaf name.
///
/// `/a/b/c` splits into (`/a/b`, `c`); `/a` splits into (`/`, `a`).
pub fn split_parent(path: &str) -> Result<(String, &str), BvfsError> {
	let segments = split(path)?;
	let leaf = segments
		.last()
		.copied()
		.ok_or_else(|| BvfsError::InvalidPath(path.to_string()))?;
	let parent = format!("/{}", segments[..segments.len() - 1].join("/"));
	Ok((parent, leaf))
}
