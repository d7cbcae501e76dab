//! The error taxonomy returned by the filesystem core, mirroring the POSIX errno
//! family a host bridge would translate these into.

use std::io;
use thiserror::Error;

/// Every way an operation on the filesystem core can fail.
#[derive(Debug, Error)]
pub enum FsError {
	/// Path resolution failed at or before the final component.
	#[error("no such file or directory")]
	NotFound,
	/// Target already present for a create/rename destination.
	#[error("file exists")]
	Exists,
	/// Operation requires a regular file, got a directory.
	#[error("is a directory")]
	IsDir,
	/// Operation requires a directory, got a regular file (or a symlink).
	#[error("operation not supported")]
	Unsupported,
	/// Offset past end-of-file on read/write.
	#[error("illegal seek")]
	Seek,
	/// Bitmap exhausted or the per-file block cap was reached.
	#[error("no space left on device")]
	NoSpace,
	/// The device adapter failed.
	#[error("i/o error: {0}")]
	Io(#[from] io::Error),
	/// Attempt to drop the root inode, or another structurally invalid request.
	#[error("invalid argument")]
	Invalid,
	/// Access check denied.
	#[error("permission denied")]
	Access,
}

pub type FsResult<T> = Result<T, FsError>;
