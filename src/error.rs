//! The closed error taxonomy every fallible BVFS operation returns.

use thiserror::Error;

/// Every error a BVFS session or file handle can produce.
#[derive(Debug, Error)]
pub enum BvfsError {
	/// The first four bytes of the image are not `"BvFs"`.
	#[error("not a BVFS image: bad magic header")]
	Magic,

	/// The image's version is newer than this crate understands.
	#[error("unsupported BVFS version {found} (this crate supports up to {})", crate::block::codec::FS_VERSION)]
	Version { found: u16 },

	/// The image's lock byte is already set: another session owns it.
	#[error("filesystem image is locked by another session")]
	Locked,

	/// A directory on the given path does not exist, or a path component
	/// resolved to a file instead of a directory.
	#[error("directory not found: {0}")]
	DirectoryNotFound(String),

	/// `rmdir` was called on a directory that still has entries.
	#[error("directory not empty: {0}")]
	DirectoryNotEmpty(String),

	/// `open` with an exclusive-create mode targeted an existing path.
	#[error("file already exists: {0}")]
	FileAlreadyExists(String),

	/// `open` targeted a path that does not exist, or that exists but is
	/// not a file.
	#[error("file not found: {0}")]
	FileNotFound(String),

	/// The path is syntactically invalid (not absolute, or a component
	/// exceeds the maximum name length).
	#[error("invalid path: {0}")]
	InvalidPath(String),

	/// The allocator could not find or reserve a free block.
	#[error("out of space: could not allocate a new block")]
	OutOfSpace,

	/// An error propagated unchanged from the host file.
	#[error("host I/O error: {0}")]
	Io(#[from] std::io::Error),
}
