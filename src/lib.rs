//! BVFS: a single-file virtual filesystem.
//!
//! A BVFS image is one host file holding a hierarchical namespace of
//! directories and files, addressed entirely through 1024-byte blocks.
//! [`Bvfs`] is the session type: format a fresh image with
//! [`Bvfs::create`], or open an existing one with [`Bvfs::open`], then
//! create directories, list them, and open files for reading or writing
//! through [`Bvfs::open_file`].
//!
//! ```no_run
//! use bvfs::{Bvfs, OpenMode};
//! use std::io::Write;
//!
//! # fn run() -> Result<(), bvfs::BvfsError> {
//! let file = std::fs::File::options().read(true).write(true).create(true).open("image.bvfs")?;
//! let mut fs = Bvfs::create(file)?;
//! fs.mkdir("/home")?;
//! let mut f = fs.open_file("/home/note.txt", OpenMode::CreateNew)?;
//! f.write_all(b"hello")?;
//! # Ok(())
//! # }
//! ```

pub(crate) mod block;
mod error;
mod file;
mod namespace;
mod path;
mod session;

pub use block::device::HostFile;
pub use error::BvfsError;
pub use file::{FileHandle, OpenMode};
pub use session::Bvfs;
