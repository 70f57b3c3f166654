//! The session: owns the block device and allocator, validates the image
//! header on open, and exposes the public directory/file operations.
//!
//! Grounded on the teacher's `Ext2Fs` (`file/fs/ext2/mod.rs`): a
//! filesystem struct that owns its block-group/allocation state and
//! exposes `create`/`load` constructors plus the directory/file
//! operations used by the VFS layer above it. BVFS has no VFS layer of
//! its own, so `Bvfs` is the whole public surface.

use crate::block::alloc::Allocator;
use crate::block::codec::{DirectoryBlock, NodeMetadata, NodeType, RootBlock, FS_VERSION};
use crate::block::device::{BlockIo, HostFile, DEFAULT_CACHE_SIZE};
use crate::block::{TYPE_ROOT, NULL_PTR};
use crate::error::BvfsError;
use crate::file::{self, FileHandle, OpenMode};
use crate::namespace;
use crate::path;
use std::io::{self, Seek, SeekFrom};

/// Byte written into the root block's lock field by the session that
/// currently owns the image.
const LOCK_HELD: u8 = 255;
/// Byte denoting an unlocked image.
const LOCK_FREE: u8 = 0;

/// An open BVFS image: a single-writer session bound to one host file.
pub struct Bvfs<F> {
	pub(crate) blockio: BlockIo<F>,
	pub(crate) alloc: Allocator,
	root_dir: u64,
}

impl<F: HostFile> Bvfs<F> {
	/// Formats `file` as a brand new, empty BVFS image: writes the root
	/// block, a single empty directory block for `/`, and opens it.
	///
	/// Any existing content in `file` is discarded.
	pub fn create(mut file: F) -> Result<Self, BvfsError> {
		file.seek(SeekFrom::Start(0))?;
		file.set_len(0)?;
		let blockio = BlockIo::new(file, DEFAULT_CACHE_SIZE)?;
		let mut alloc = Allocator::new();

		let root_block_idx = alloc.allocate(&blockio)?;
		debug_assert_eq!(root_block_idx, 0, "root block must be block 0");
		let root_dir_idx = alloc.allocate(&blockio)?;
		blockio.write(root_dir_idx, &DirectoryBlock::empty().encode())?;
		blockio.write(root_block_idx, &RootBlock::new(root_dir_idx).encode())?;

		log::info!("formatted new BVFS image, root directory at block {root_dir_idx}");
		Ok(Self {
			blockio,
			alloc,
			root_dir: root_dir_idx,
		})
	}

	/// Opens an existing BVFS image, validating its magic header and
	/// version and taking its lock.
	///
	/// Fails with [`BvfsError::Magic`] or [`BvfsError::Version`] if the
	/// header is not recognized, and with [`BvfsError::Locked`] if
	/// another session already holds the lock.
	pub fn open(file: F) -> Result<Self, BvfsError> {
		Self::open_with_cache(file, DEFAULT_CACHE_SIZE)
	}

	/// Like [`Bvfs::open`], with an explicit block-cache size.
	pub fn open_with_cache(file: F, cache_size: usize) -> Result<Self, BvfsError> {
		let blockio = BlockIo::new(file, cache_size)?;
		let block = blockio.read(0)?;
		if block.type_tag() != TYPE_ROOT {
			return Err(BvfsError::Magic);
		}
		let mut root = RootBlock::decode(&block);
		if root.magic != crate::block::codec::MAGIC {
			return Err(BvfsError::Magic);
		}
		if root.version > FS_VERSION {
			return Err(BvfsError::Version { found: root.version });
		}
		if root.lock != LOCK_FREE {
			return Err(BvfsError::Locked);
		}
		root.lock = LOCK_HELD;
		blockio.write(0, &root.encode())?;

		log::info!("opened BVFS image, root directory at block {}", root.root_dir);
		Ok(Self {
			blockio,
			alloc: Allocator::new(),
			root_dir: root.root_dir,
		})
	}

	/// Releases the image's lock and flushes the host file. Further use
	/// of this session after `close` is a logic error the caller must
	/// avoid (enforced by `close` consuming `self`).
	pub fn close(mut self) -> Result<(), BvfsError> {
		let mut root = RootBlock::decode(&self.blockio.read(0)?);
		root.lock = LOCK_FREE;
		self.blockio.write(0, &root.encode())?;
		self.blockio.flush()?;
		Ok(())
	}

	/// Creates a directory at `path`. The parent directory must already
	/// exist.
	pub fn mkdir(&mut self, path: &str) -> Result<(), BvfsError> {
		let (parent, leaf) = path::split_parent(path)?;
		let parent_dir = namespace::open_directory(&self.blockio, self.root_dir, &path::split(&parent)?)?;
		if namespace::find_entry(&self.blockio, parent_dir, leaf)?.is_some() {
			return Err(BvfsError::FileAlreadyExists(path.to_string()));
		}
		let metadata_ptr = self.alloc.allocate(&self.blockio)?;
		self.blockio.write(metadata_ptr, &NodeMetadata::new(NodeType::Directory).encode())?;
		let new_dir = self.alloc.allocate(&self.blockio)?;
		self.blockio.write(new_dir, &DirectoryBlock::empty().encode())?;
		namespace::write_directory_node(&self.blockio, &mut self.alloc, parent_dir, metadata_ptr, new_dir, leaf)?;
		log::debug!("mkdir {path}: directory block {new_dir}");
		Ok(())
	}

	/// Removes the empty directory at `path`.
	///
	/// Fails with [`BvfsError::DirectoryNotEmpty`] if it still has
	/// entries.
	pub fn rmdir(&mut self, path: &str) -> Result<(), BvfsError> {
		let (parent, leaf) = path::split_parent(path)?;
		let parent_dir = namespace::open_directory(&self.blockio, self.root_dir, &path::split(&parent)?)?;
		let (block_idx, slot, entry) = namespace::find_entry(&self.blockio, parent_dir, leaf)?
			.ok_or_else(|| BvfsError::DirectoryNotFound(path.to_string()))?;
		let metadata = NodeMetadata::decode(&self.blockio.read(entry.metadata_ptr)?);
		if metadata.node_type != NodeType::Directory {
			return Err(BvfsError::DirectoryNotFound(format!("{path}: not a directory")));
		}
		if namespace::chain_has_entries(&self.blockio, entry.subtree_ptr)? {
			return Err(BvfsError::DirectoryNotEmpty(path.to_string()));
		}
		namespace::deallocate_chain(&self.blockio, &mut self.alloc, entry.subtree_ptr)?;
		self.alloc.deallocate(&self.blockio, entry.metadata_ptr)?;
		namespace::clear_entry(&self.blockio, block_idx, slot)?;
		namespace::compact(&self.blockio, &mut self.alloc, parent_dir)?;
		log::debug!("rmdir {path}");
		Ok(())
	}

	/// Lists the names of the entries directly inside the directory at
	/// `path`, in on-disk chain order.
	pub fn lsdir(&self, path: &str) -> Result<Vec<String>, BvfsError> {
		let dir = namespace::open_directory(&self.blockio, self.root_dir, &path::split(path)?)?;
		namespace::lsdir(&self.blockio, dir)
	}

	/// Tells whether `path` names an existing directory or file entry.
	pub fn exists(&self, path: &str) -> Result<bool, BvfsError> {
		let (parent, leaf) = path::split_parent(path)?;
		let parent_dir = match namespace::open_directory(&self.blockio, self.root_dir, &path::split(&parent)?) {
			Ok(dir) => dir,
			Err(BvfsError::DirectoryNotFound(_)) => return Ok(false),
			Err(e) => return Err(e),
		};
		Ok(namespace::find_entry(&self.blockio, parent_dir, leaf)?.is_some())
	}

	/// Opens `path` as a file per `mode`. See [`OpenMode`] for the exact
	/// semantics of each variant.
	pub fn open_file(&mut self, path: &str, mode: OpenMode) -> Result<FileHandle<'_, F>, BvfsError> {
		let (parent, leaf) = path::split_parent(path)?;
		let parent_dir = namespace::open_directory(&self.blockio, self.root_dir, &path::split(&parent)?)?;
		let existing = namespace::find_entry(&self.blockio, parent_dir, leaf)?;

		match mode {
			OpenMode::CreateNew => {
				if existing.is_some() {
					return Err(BvfsError::FileAlreadyExists(path.to_string()));
				}
				let metadata_ptr = self.create_file_entry(parent_dir, leaf)?;
				Ok(FileHandle::new(self, parent_dir, leaf.to_string(), metadata_ptr, NULL_PTR, 0))
			}
			OpenMode::Write => {
				if let Some((_, _, entry)) = &existing {
					let metadata = NodeMetadata::decode(&self.blockio.read(entry.metadata_ptr)?);
					if metadata.node_type != NodeType::File {
						return Err(BvfsError::FileNotFound(format!("{path}: is a directory")));
					}
					file::remove_file(&self.blockio, &mut self.alloc, parent_dir, leaf, entry.metadata_ptr, entry.subtree_ptr)?;
				}
				let metadata_ptr = self.create_file_entry(parent_dir, leaf)?;
				Ok(FileHandle::new(self, parent_dir, leaf.to_string(), metadata_ptr, NULL_PTR, 0))
			}
			OpenMode::Read => {
				let (_, _, entry) = existing.ok_or_else(|| BvfsError::FileNotFound(path.to_string()))?;
				let metadata = NodeMetadata::decode(&self.blockio.read(entry.metadata_ptr)?);
				if metadata.node_type != NodeType::File {
					return Err(BvfsError::FileNotFound(format!("{path}: is not a file")));
				}
				Ok(FileHandle::new(self, parent_dir, leaf.to_string(), entry.metadata_ptr, entry.subtree_ptr, 0))
			}
			OpenMode::Append => {
				let (_, _, entry) = existing.ok_or_else(|| BvfsError::FileNotFound(path.to_string()))?;
				let metadata = NodeMetadata::decode(&self.blockio.read(entry.metadata_ptr)?);
				if metadata.node_type != NodeType::File {
					return Err(BvfsError::FileNotFound(format!("{path}: is not a file")));
				}
				let size = metadata.size;
				Ok(FileHandle::new(self, parent_dir, leaf.to_string(), entry.metadata_ptr, entry.subtree_ptr, size))
			}
		}
	}

	fn create_file_entry(&mut self, parent_dir: u64, name: &str) -> Result<u64, BvfsError> {
		let metadata_ptr = self.alloc.allocate(&self.blockio)?;
		self.blockio.write(metadata_ptr, &NodeMetadata::new(NodeType::File).encode())?;
		namespace::write_directory_node(&self.blockio, &mut self.alloc, parent_dir, metadata_ptr, NULL_PTR, name)?;
		Ok(metadata_ptr)
	}
}

/// Path-based convenience constructors for the common case of a session
/// backed by an ordinary OS file, on top of the generic, host-file-agnostic
/// constructors above (which tests use with an in-memory host file
/// instead).
impl Bvfs<std::fs::File> {
	/// Formats a brand new BVFS image at `path`, creating or truncating the
	/// file as needed.
	pub fn create_fs(path: impl AsRef<std::path::Path>) -> io::Result<()> {
		let file = std::fs::File::options()
			.read(true)
			.write(true)
			.create(true)
			.truncate(true)
			.open(path)?;
		Self::create(file).map(|_| ()).map_err(into_io_error)
	}

	/// Opens the BVFS image stored at `path`.
	pub fn open_path(path: impl AsRef<std::path::Path>) -> Result<Self, BvfsError> {
		let file = std::fs::File::options().read(true).write(true).open(path)?;
		Self::open(file)
	}

	/// Like [`Bvfs::open_path`], with an explicit block-cache size.
	pub fn open_path_with_cache(path: impl AsRef<std::path::Path>, cache_size: usize) -> Result<Self, BvfsError> {
		let file = std::fs::File::options().read(true).write(true).open(path)?;
		Self::open_with_cache(file, cache_size)
	}
}

fn into_io_error(err: BvfsError) -> io::Error {
	match err {
		BvfsError::Io(e) => e,
		other => io::Error::new(io::ErrorKind::Other, other),
	}
}

