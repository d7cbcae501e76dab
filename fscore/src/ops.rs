//! The namespace façade: the dozen host-facing operations a FUSE-style bridge
//! would call, built on top of the resolver and the inode/directory store.

use utils::util::ceil_division;
use utils::util::get_timestamp;

use crate::device::Device;
use crate::error::FsError;
use crate::error::FsResult;
use crate::graph::InodeHandle;
use crate::layout::FileType;
use crate::layout::DEFAULT_PERM;
use crate::mount::Mount;

pub const F_OK: u32 = 0;
pub const X_OK: u32 = 1;
pub const W_OK: u32 = 2;
pub const R_OK: u32 = 4;

/// Attributes synthesized for `getattr`: nothing is stored on disk beyond
/// size, type and link count, so mode/atime/mtime are derived at query time.
#[derive(Debug, Clone, Copy)]
pub struct Attr {
	pub ino: u32,
	pub file_type: FileType,
	pub mode: u32,
	pub size: u64,
	pub blocks: u64,
	pub links: u32,
	pub atime: u64,
	pub mtime: u64,
}

/// A single directory entry, as returned by `readdir`.
#[derive(Debug, Clone)]
pub struct DirEntry {
	pub name: String,
	pub ino: u32,
	pub file_type: FileType,
}

/// An open-file handle, as returned by `open`/`opendir`.
#[derive(Debug, Clone, Copy)]
pub struct Handle {
	pub(crate) inode: InodeHandle,
}

impl Handle {
	/// The inode this handle was opened against.
	pub fn inode(&self) -> InodeHandle {
		self.inode
	}
}

impl<D: Device> Mount<D> {
	pub fn getattr(&mut self, path: &str) -> FsResult<Attr> {
		let res = self.lookup(path)?;
		if !res.found {
			return Err(FsError::NotFound);
		}
		let now = get_timestamp().as_secs();

		if res.is_root {
			let inode = self.graph.dentries.get(res.dentry).inode.unwrap();
			let node = self.graph.inodes.get(inode);
			return Ok(Attr {
				ino: node.ino,
				file_type: FileType::Dir,
				mode: DEFAULT_PERM,
				size: self.usage(),
				blocks: self.device_size() / self.block_size(),
				links: 2,
				atime: now,
				mtime: now,
			});
		}

		let inode = self.graph.dentries.get(res.dentry).inode.unwrap();
		let node = self.graph.inodes.get(inode);
		Ok(Attr {
			ino: node.ino,
			file_type: node.file_type,
			mode: DEFAULT_PERM,
			size: node.size,
			blocks: node.data_blk_cnt as u64,
			links: node.link,
			atime: now,
			mtime: now,
		})
	}

	/// Returns the single child at position `offset` within a directory, or
	/// `None` once `offset` runs past the child count.
	pub fn readdir(&mut self, path: &str, offset: usize) -> FsResult<Option<DirEntry>> {
		let res = self.lookup(path)?;
		if !res.found {
			return Err(FsError::NotFound);
		}
		let file_type = self.graph.dentries.get(res.dentry).file_type;
		if file_type != FileType::Dir {
			return Err(FsError::Unsupported);
		}
		let inode = self.graph.dentries.get(res.dentry).inode.unwrap();
		let children = self.graph.children(inode);
		match children.get(offset) {
			Some(&child) => {
				let node = self.graph.dentries.get(child);
				Ok(Some(DirEntry {
					name: node.name.clone(),
					ino: node.ino,
					file_type: node.file_type,
				}))
			}
			None => Ok(None),
		}
	}

	fn create(&mut self, path: &str, file_type: FileType) -> FsResult<()> {
		let (parent, name) = self.resolve_parent(path)?;
		let name = name.to_string();
		if name.is_empty() {
			return Err(FsError::Invalid);
		}
		let parent_type = self.graph.dentries.get(parent).file_type;
		if parent_type != FileType::Dir {
			return Err(FsError::Unsupported);
		}
		let parent_inode = self.graph.dentries.get(parent).inode.unwrap();
		if self
			.graph
			.children(parent_inode)
			.into_iter()
			.any(|h| self.graph.dentries.get(h).name == name)
		{
			return Err(FsError::Exists);
		}

		let child = self.graph.dentries.insert(crate::graph::DentryNode {
			name,
			ino: 0,
			file_type,
			parent: Some(parent),
			next_sibling: None,
			inode: None,
		});
		self.alloc_inode_for(child, file_type)?;
		self.graph.link_child(parent_inode, child);
		Ok(())
	}

	pub fn mkdir(&mut self, path: &str) -> FsResult<()> {
		self.create(path, FileType::Dir)
	}

	pub fn mknod(&mut self, path: &str) -> FsResult<()> {
		self.create(path, FileType::Reg)
	}

	pub fn read(&mut self, path: &str, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
		let res = self.lookup(path)?;
		if !res.found {
			return Err(FsError::NotFound);
		}
		let file_type = self.graph.dentries.get(res.dentry).file_type;
		if file_type != FileType::Reg {
			return Err(FsError::IsDir);
		}
		let inode = self.graph.dentries.get(res.dentry).inode.unwrap();
		let node = self.graph.inodes.get(inode);
		if offset > node.size {
			return Err(FsError::Seek);
		}
		let data = node.data.as_ref().expect("REG inode missing buffer");
		let end = (offset + buf.len() as u64).min(node.size);
		let n = (end - offset) as usize;
		buf[..n].copy_from_slice(&data[offset as usize..offset as usize + n]);
		Ok(n)
	}

	pub fn write(&mut self, path: &str, offset: u64, buf: &[u8]) -> FsResult<usize> {
		let res = self.lookup(path)?;
		if !res.found {
			return Err(FsError::NotFound);
		}
		let file_type = self.graph.dentries.get(res.dentry).file_type;
		if file_type != FileType::Reg {
			return Err(FsError::IsDir);
		}
		let inode = self.graph.dentries.get(res.dentry).inode.unwrap();
		let node = self.graph.inodes.get(inode);
		if offset > node.size {
			return Err(FsError::Seek);
		}
		let file_max = self.file_max();
		if offset + buf.len() as u64 > file_max {
			return Err(FsError::NoSpace);
		}

		let block_size = self.block_size();
		let node = self.graph.inodes.get_mut(inode);
		let data = node.data.as_mut().expect("REG inode missing buffer");
		let end = offset + buf.len() as u64;
		data[offset as usize..end as usize].copy_from_slice(buf);
		if end > node.size {
			node.size = end;
		}

		let first_block = (offset / block_size) as usize;
		let last_block = ((end.saturating_sub(1)) / block_size) as usize;
		for slot in first_block..=last_block {
			node.dirty[slot] = true;
		}
		Ok(buf.len())
	}

	pub fn truncate(&mut self, path: &str, new_size: u64) -> FsResult<()> {
		let res = self.lookup(path)?;
		if !res.found {
			return Err(FsError::NotFound);
		}
		let file_type = self.graph.dentries.get(res.dentry).file_type;
		if file_type != FileType::Reg {
			return Err(FsError::IsDir);
		}
		let inode = self.graph.dentries.get(res.dentry).inode.unwrap();
		let block_size = self.block_size();
		let new_blk_cnt = ceil_division(new_size, block_size) as u32;

		let node = self.graph.inodes.get_mut(inode);
		node.size = new_size;
		let to_free: Vec<(usize, i32)> = (new_blk_cnt as usize..crate::layout::DATA_PER_FILE)
			.map(|slot| (slot, node.block_pointer[slot]))
			.filter(|&(_, ptr)| ptr >= 0)
			.collect();
		for (slot, ptr) in to_free {
			self.free_data_block(ptr);
			let node = self.graph.inodes.get_mut(inode);
			node.block_pointer[slot] = -1;
			node.dirty[slot] = false;
		}
		let node = self.graph.inodes.get_mut(inode);
		node.data_blk_cnt = new_blk_cnt;
		Ok(())
	}

	pub fn unlink(&mut self, path: &str) -> FsResult<()> {
		let res = self.lookup(path)?;
		if !res.found {
			return Err(FsError::NotFound);
		}
		let file_type = self.graph.dentries.get(res.dentry).file_type;
		if file_type != FileType::Reg {
			return Err(FsError::IsDir);
		}
		let parent = self.graph.dentries.get(res.dentry).parent.ok_or(FsError::Invalid)?;
		let parent_inode = self.graph.dentries.get(parent).inode.unwrap();
		let inode = self.graph.dentries.get(res.dentry).inode.unwrap();
		self.drop_inode(inode)?;
		self.graph.unlink_child(parent_inode, res.dentry);
		self.graph.dentries.remove(res.dentry);
		Ok(())
	}

	pub fn rmdir(&mut self, path: &str) -> FsResult<()> {
		let res = self.lookup(path)?;
		if !res.found {
			return Err(FsError::NotFound);
		}
		let file_type = self.graph.dentries.get(res.dentry).file_type;
		if file_type != FileType::Dir {
			return Err(FsError::Unsupported);
		}
		if res.is_root {
			return Err(FsError::Invalid);
		}
		let parent = self.graph.dentries.get(res.dentry).parent.ok_or(FsError::Invalid)?;
		let parent_inode = self.graph.dentries.get(parent).inode.unwrap();
		let inode = self.graph.dentries.get(res.dentry).inode.unwrap();
		self.drop_inode(inode)?;
		self.graph.unlink_child(parent_inode, res.dentry);
		self.graph.dentries.remove(res.dentry);
		Ok(())
	}

	/// Resolves the destination's parent explicitly and uses only its final
	/// path component, rather than the whole source path, as the new name.
	pub fn rename(&mut self, from: &str, to: &str) -> FsResult<()> {
		let from_res = self.lookup(from)?;
		if !from_res.found {
			return Err(FsError::NotFound);
		}
		let to_res = self.lookup(to)?;
		if to_res.found {
			return Err(FsError::Exists);
		}
		let (new_parent, new_name) = self.resolve_parent(to)?;
		let new_parent_type = self.graph.dentries.get(new_parent).file_type;
		if new_parent_type != FileType::Dir {
			return Err(FsError::Unsupported);
		}

		let old_parent = self.graph.dentries.get(from_res.dentry).parent.ok_or(FsError::Invalid)?;
		let old_parent_inode = self.graph.dentries.get(old_parent).inode.unwrap();
		self.graph.unlink_child(old_parent_inode, from_res.dentry);

		let new_parent_inode = self.graph.dentries.get(new_parent).inode.unwrap();
		let node = self.graph.dentries.get_mut(from_res.dentry);
		node.name = new_name.to_string();
		node.parent = Some(new_parent);
		self.graph.link_child(new_parent_inode, from_res.dentry);
		Ok(())
	}

	pub fn access(&mut self, path: &str, mode: u32) -> FsResult<()> {
		if mode == F_OK {
			let res = self.lookup(path)?;
			return if res.found { Ok(()) } else { Err(FsError::Access) };
		}
		Ok(())
	}

	pub fn open(&mut self, path: &str) -> FsResult<Handle> {
		let res = self.lookup(path)?;
		if !res.found {
			return Err(FsError::NotFound);
		}
		let file_type = self.graph.dentries.get(res.dentry).file_type;
		if file_type != FileType::Reg {
			return Err(FsError::Unsupported);
		}
		Ok(Handle {
			inode: self.graph.dentries.get(res.dentry).inode.unwrap(),
		})
	}

	pub fn opendir(&mut self, path: &str) -> FsResult<Handle> {
		let res = self.lookup(path)?;
		if !res.found {
			return Err(FsError::NotFound);
		}
		let file_type = self.graph.dentries.get(res.dentry).file_type;
		if file_type != FileType::Dir {
			return Err(FsError::Unsupported);
		}
		Ok(Handle {
			inode: self.graph.dentries.get(res.dentry).inode.unwrap(),
		})
	}
}
