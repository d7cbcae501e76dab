//! Superblock lifecycle: mount, unmount, and the inode/directory store that
//! moves records between the on-disk layout (`layout`) and the in-memory
//! object graph (`graph`).

use log::debug;
use log::warn;

use crate::bitmap::Bitmap;
use crate::device::BlockIo;
use crate::device::Device;
use crate::error::FsError;
use crate::error::FsResult;
use crate::graph::DentryHandle;
use crate::graph::DentryNode;
use crate::graph::Graph;
use crate::graph::InodeHandle;
use crate::graph::InodeNode;
use crate::layout::DentryDisk;
use crate::layout::FileType;
use crate::layout::InodeDisk;
use crate::layout::SuperBlockDisk;
use crate::layout::DATA_BLKS;
use crate::layout::DATA_PER_FILE;
use crate::layout::INODE_BLKS;
use crate::layout::MAGIC;
use crate::layout::MAP_DATA_BLKS;
use crate::layout::MAP_INODE_BLKS;
use crate::layout::ROOT_INO;
use crate::layout::SUPER_BLKS;

/// Block-granular offsets and sizes of every on-disk region.
#[derive(Clone, Copy)]
struct Regions {
	ino_map_offset: u64,
	ino_map_blks: u64,
	data_map_offset: u64,
	data_map_blks: u64,
	ino_offset: u64,
	ino_blks: u64,
	data_offset: u64,
	data_blks: u64,
	ino_max: u64,
	file_max: u64,
}

impl Regions {
	fn fresh() -> Self {
		let ino_map_offset = SUPER_BLKS;
		let data_map_offset = ino_map_offset + MAP_INODE_BLKS;
		let ino_offset = data_map_offset + MAP_DATA_BLKS;
		let data_offset = ino_offset + INODE_BLKS;
		Self {
			ino_map_offset,
			ino_map_blks: MAP_INODE_BLKS,
			data_map_offset,
			data_map_blks: MAP_DATA_BLKS,
			ino_offset,
			ino_blks: INODE_BLKS,
			data_offset,
			data_blks: DATA_BLKS,
			ino_max: INODE_BLKS,
			file_max: 0, // filled in once block_size is known
		}
	}

	fn from_disk(d: &SuperBlockDisk) -> Self {
		Self {
			ino_map_offset: d.ino_map_offset,
			ino_map_blks: d.ino_map_blks,
			data_map_offset: d.data_map_offset,
			data_map_blks: d.data_map_blks,
			ino_offset: d.ino_offset,
			ino_blks: d.ino_blks,
			data_offset: d.data_offset,
			data_blks: d.data_blks,
			ino_max: d.ino_max,
			file_max: d.file_max,
		}
	}

	fn to_disk(&self, usage: u64) -> SuperBlockDisk {
		SuperBlockDisk {
			magic: MAGIC,
			ino_map_offset: self.ino_map_offset,
			ino_map_blks: self.ino_map_blks,
			data_map_offset: self.data_map_offset,
			data_map_blks: self.data_map_blks,
			ino_offset: self.ino_offset,
			ino_blks: self.ino_blks,
			data_offset: self.data_offset,
			data_blks: self.data_blks,
			ino_max: self.ino_max,
			file_max: self.file_max,
			sz_usage: usage,
		}
	}
}

/// A live mount: the device, the on-disk layout, both bitmaps, and the
/// in-memory dentry/inode graph rooted at `root`.
pub struct Mount<D: Device> {
	io: BlockIo<D>,
	regions: Regions,
	ino_bitmap: Bitmap,
	data_bitmap: Bitmap,
	usage: u64,
	pub(crate) graph: Graph,
	pub(crate) root: DentryHandle,
}

impl<D: Device> Mount<D> {
	/// Mounts `device`: reads an existing layout, or initializes a fresh one if
	/// the magic number is absent.
	pub fn mount(device: D) -> FsResult<Self> {
		let mut io = BlockIo::new(device);
		let block_size = io.block_size() as u64;

		let super_bytes = io.read(0, std::mem::size_of::<SuperBlockDisk>())?;
		let on_disk = SuperBlockDisk::from_bytes(&super_bytes);

		let needs_init = on_disk.magic != MAGIC;
		let mut regions = if needs_init {
			let mut r = Regions::fresh();
			r.file_max = DATA_PER_FILE as u64 * block_size;
			r
		} else {
			Regions::from_disk(&on_disk)
		};
		if regions.file_max == 0 {
			regions.file_max = DATA_PER_FILE as u64 * block_size;
		}

		let ino_bitmap_bytes = (regions.ino_map_blks * block_size) as usize;
		let data_bitmap_bytes = (regions.data_map_blks * block_size) as usize;

		let ino_bitmap = if needs_init {
			Bitmap::new(ino_bitmap_bytes)
		} else {
			Bitmap::from_bytes(io.read(regions.ino_map_offset * block_size, ino_bitmap_bytes)?)
		};
		let data_bitmap = if needs_init {
			Bitmap::new(data_bitmap_bytes)
		} else {
			Bitmap::from_bytes(io.read(regions.data_map_offset * block_size, data_bitmap_bytes)?)
		};

		let mut graph = Graph::new();
		let root = graph.dentries.insert(DentryNode {
			name: "/".to_string(),
			ino: ROOT_INO,
			file_type: FileType::Dir,
			parent: None,
			next_sibling: None,
			inode: None,
		});

		let mut mount = Self {
			io,
			regions,
			ino_bitmap,
			data_bitmap,
			usage: on_disk.sz_usage,
			graph,
			root,
		};

		if needs_init {
			debug!("initializing fresh filesystem layout");
			let limit = mount.regions.ino_map_blks * block_size * 8;
			let ino = mount
				.ino_bitmap
				.alloc_first_fit(limit)
				.ok_or(FsError::NoSpace)? as u32;
			debug_assert_eq!(ino, ROOT_INO);
			let root_inode = mount.graph.inodes.insert(InodeNode {
				ino,
				file_type: FileType::Dir,
				link: 1,
				size: 0,
				data_blk_cnt: 0,
				block_pointer: [-1; DATA_PER_FILE],
				dirty: [false; DATA_PER_FILE],
				data: None,
				owner_dentry: mount.root,
				children_head: None,
				child_count: 0,
			});
			mount.graph.dentries.get_mut(mount.root).inode = Some(root_inode);
			mount.sync_inode(root_inode)?;
		} else {
			let root_inode = mount.read_inode(mount.root, ROOT_INO)?;
			mount.graph.dentries.get_mut(mount.root).inode = Some(root_inode);
		}
		Ok(mount)
	}

	pub fn root(&self) -> DentryHandle {
		self.root
	}

	pub fn block_size(&self) -> u64 {
		self.io.block_size() as u64
	}

	pub fn device_size(&self) -> u64 {
		self.io.device_size()
	}

	pub fn usage(&self) -> u64 {
		self.usage
	}

	pub fn file_max(&self) -> u64 {
		self.regions.file_max
	}

	/// Recursively flushes the whole graph, then writes the superblock and
	/// bitmaps, and hands the device back so it can be remounted or closed.
	pub fn unmount(mut self) -> FsResult<D> {
		let root_inode = *self
			.graph
			.dentries
			.get(self.root)
			.inode
			.as_ref()
			.ok_or(FsError::Invalid)?;
		self.sync_inode(root_inode)?;

		let block_size = self.block_size();
		let on_disk = self.regions.to_disk(self.usage);
		self.io.write(0, on_disk.as_bytes())?;
		self.io
			.write(self.regions.ino_map_offset * block_size, self.ino_bitmap.as_bytes())?;
		self.io
			.write(self.regions.data_map_offset * block_size, self.data_bitmap.as_bytes())?;
		Ok(self.io.into_device())
	}

	fn inode_offset(&self, ino: u32) -> u64 {
		(self.regions.ino_offset + ino as u64) * self.block_size()
	}

	fn data_offset(&self, data_idx: i32) -> u64 {
		(self.regions.data_offset + data_idx as u64) * self.block_size()
	}

	/// Allocates an inode number and wires it to `dentry`, without touching
	/// disk. Used by mkdir/mknod (the directory store, §4.5).
	pub fn alloc_inode_for(&mut self, dentry: DentryHandle, file_type: FileType) -> FsResult<InodeHandle> {
		let block_size = self.block_size();
		let limit = self.regions.ino_map_blks * block_size * 8;
		let ino = self
			.ino_bitmap
			.alloc_first_fit(limit)
			.filter(|&ino| ino < self.regions.ino_max)
			.ok_or(FsError::NoSpace)? as u32;

		let node = InodeNode {
			ino,
			file_type,
			link: 1,
			size: 0,
			data_blk_cnt: 0,
			block_pointer: [-1; DATA_PER_FILE],
			dirty: [false; DATA_PER_FILE],
			data: if file_type == FileType::Reg {
				Some(vec![0u8; DATA_PER_FILE * block_size as usize])
			} else {
				None
			},
			owner_dentry: dentry,
			children_head: None,
			child_count: 0,
		};
		let handle = self.graph.inodes.insert(node);
		self.graph.dentries.get_mut(dentry).inode = Some(handle);
		self.graph.dentries.get_mut(dentry).ino = ino;
		Ok(handle)
	}

	/// Allocates one more data block for `inode` and returns its data-area
	/// index. The scan length is intentionally bounded by the inode bitmap's
	/// size rather than the data bitmap's, matching the original allocator.
	fn alloc_data_block(&mut self, inode: InodeHandle) -> FsResult<i32> {
		let node = self.graph.inodes.get(inode);
		if node.data_blk_cnt as usize == DATA_PER_FILE {
			return Err(FsError::NoSpace);
		}
		let block_size = self.block_size();
		let limit = self.regions.ino_map_blks * block_size * 8;
		let idx = self
			.data_bitmap
			.alloc_first_fit(limit)
			.filter(|&idx| idx < self.regions.data_blks)
			.ok_or(FsError::NoSpace)? as i32;

		let node = self.graph.inodes.get_mut(inode);
		node.block_pointer[node.data_blk_cnt as usize] = idx;
		node.data_blk_cnt += 1;
		Ok(idx)
	}

	pub(crate) fn free_data_block(&mut self, idx: i32) {
		if idx >= 0 {
			self.data_bitmap.clear(idx as u64);
		}
	}

	/// Reads an on-disk inode record plus, for directories, the full child
	/// list streamed across its data blocks, and returns the new in-memory
	/// handle attached to `owner`.
	pub fn read_inode(&mut self, owner: DentryHandle, ino: u32) -> FsResult<InodeHandle> {
		let block_size = self.block_size();
		let bytes = self
			.io
			.read(self.inode_offset(ino), std::mem::size_of::<InodeDisk>())?;
		let disk = InodeDisk::from_bytes(&bytes);
		let file_type = FileType::from_tag(disk.file_type);

		let mut node = InodeNode {
			ino,
			file_type,
			link: disk.link,
			size: disk.size,
			data_blk_cnt: disk.data_blk_cnt,
			block_pointer: disk.block_pointer,
			dirty: [false; DATA_PER_FILE],
			data: None,
			owner_dentry: owner,
			children_head: None,
			child_count: 0,
		};

		match file_type {
			FileType::Dir => {
				let record_size = DentryDisk::size() as u64;
				let mut blk_idx = 0usize;
				let mut blk_off = 0u64;
				// size is rebuilt below as children link in, not taken from disk.
				node.size = 0;
				let inode_handle = self.graph.inodes.insert(node);
				for _ in 0..disk.child_count {
					if blk_off + record_size > block_size {
						blk_idx += 1;
						blk_off = 0;
					}
					let ptr = self.graph.inodes.get(inode_handle).block_pointer[blk_idx];
					if ptr < 0 {
						warn!("directory inode {ino} child_count exceeds assigned blocks");
						break;
					}
					let rec_bytes = self
						.io
						.read(self.data_offset(ptr) + blk_off, record_size as usize)?;
					let rec = DentryDisk::from_bytes(&rec_bytes);
					let child = self.graph.dentries.insert(DentryNode {
						name: rec.name(),
						ino: rec.ino,
						file_type: FileType::from_tag(rec.file_type),
						parent: Some(owner),
						next_sibling: None,
						inode: None,
					});
					self.graph.link_child(inode_handle, child);
					blk_off += record_size;
				}
				return Ok(inode_handle);
			}
			FileType::Reg => {
				let mut buf = vec![0u8; DATA_PER_FILE * block_size as usize];
				for (slot, &ptr) in node.block_pointer.iter().enumerate() {
					if ptr >= 0 {
						let blk = self.io.read(self.data_offset(ptr), block_size as usize)?;
						buf[slot * block_size as usize..(slot + 1) * block_size as usize]
							.copy_from_slice(&blk);
					}
				}
				node.data = Some(buf);
			}
			FileType::Sym => {}
		}
		Ok(self.graph.inodes.insert(node))
	}

	/// Recursively writes `inode` and, for directories, its children, back to
	/// disk, allocating blocks on demand as the original sync walk does.
	pub fn sync_inode(&mut self, inode: InodeHandle) -> FsResult<()> {
		let file_type = self.graph.inodes.get(inode).file_type;
		let block_size = self.block_size();

		match file_type {
			FileType::Dir => {
				let children = self.graph.children(inode);
				let record_size = DentryDisk::size() as u64;
				let mut blk_idx = 0usize;
				let mut blk_off = 0u64;
				for &child in &children {
					if blk_off + record_size > block_size {
						blk_idx += 1;
						blk_off = 0;
					}
					let ptr = self.graph.inodes.get(inode).block_pointer[blk_idx];
					let ptr = if ptr < 0 {
						self.alloc_data_block(inode)?
					} else {
						ptr
					};
					let child_node = self.graph.dentries.get(child);
					let rec = DentryDisk::new(&child_node.name, child_node.ino, child_node.file_type);
					self.io.write(self.data_offset(ptr) + blk_off, rec.as_bytes())?;
					blk_off += record_size;

					if let Some(child_inode) = self.graph.dentries.get(child).inode {
						self.sync_inode(child_inode)?;
					}
				}
			}
			FileType::Reg => {
				for slot in 0..DATA_PER_FILE {
					let (dirty, ptr) = {
						let node = self.graph.inodes.get(inode);
						(node.dirty[slot], node.block_pointer[slot])
					};
					if !dirty {
						continue;
					}
					let ptr = if ptr < 0 { self.alloc_data_block(inode)? } else { ptr };
					let node = self.graph.inodes.get(inode);
					let data = node.data.as_ref().expect("REG inode missing buffer");
					let slice = &data[slot * block_size as usize..(slot + 1) * block_size as usize];
					self.io.write(self.data_offset(ptr), slice)?;
					self.graph.inodes.get_mut(inode).dirty[slot] = false;
				}
			}
			FileType::Sym => {}
		}

		let node = self.graph.inodes.get(inode);
		let disk = InodeDisk::new(
			node.ino,
			node.file_type,
			node.size,
			node.link,
			node.data_blk_cnt,
			node.child_count,
			node.block_pointer,
		);
		self.io.write(self.inode_offset(node.ino), disk.as_bytes())?;
		Ok(())
	}

	/// Recursively drops `inode` (and, for directories, every descendant),
	/// clearing bitmap bits and freeing the in-memory graph nodes. Refuses to
	/// drop the root.
	pub fn drop_inode(&mut self, inode: InodeHandle) -> FsResult<()> {
		let node = self.graph.inodes.get(inode);
		if node.ino == ROOT_INO {
			return Err(FsError::Invalid);
		}
		if node.file_type == FileType::Dir {
			let children = self.graph.children(inode);
			for child in children {
				if let Some(child_inode) = self.graph.dentries.get(child).inode {
					self.drop_inode(child_inode)?;
				}
				self.graph.unlink_child(inode, child);
				self.graph.dentries.remove(child);
			}
		}

		let node = self.graph.inodes.get(inode);
		let ino = node.ino;
		let block_pointer = node.block_pointer;
		self.ino_bitmap.clear(ino as u64);
		for ptr in block_pointer {
			self.free_data_block(ptr);
		}
		self.graph.inodes.remove(inode);
		Ok(())
	}
}
