//! Core of a userspace filesystem: on-disk layout, mount/unmount lifecycle,
//! bitmap allocator, the in-memory inode/dentry graph, and the namespace
//! operations a host bridge calls into.
//!
//! Persistence happens only at [`Mount::unmount`] — everything between mount
//! and unmount lives in memory (see `mount` and `ops`).

pub mod bitmap;
pub mod device;
pub mod error;
pub mod graph;
pub mod layout;
pub mod mount;
pub mod ops;
pub mod resolve;

pub use device::BlockIo;
pub use device::Device;
pub use device::FileDevice;
pub use device::MemDevice;
pub use error::FsError;
pub use error::FsResult;
pub use layout::FileType;
pub use mount::Mount;
pub use ops::Attr;
pub use ops::DirEntry;
pub use ops::Handle;
pub use ops::F_OK;
pub use ops::R_OK;
pub use ops::W_OK;
pub use ops::X_OK;
pub use resolve::Resolution;
