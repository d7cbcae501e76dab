//! Path resolution. Never mutates the graph; the namespace façade (`ops`)
//! drives materialization and mutation around what this returns.

use crate::device::Device;
use crate::error::FsResult;
use crate::graph::DentryHandle;
use crate::layout::FileType;
use crate::mount::Mount;

/// Outcome of resolving a path against the tree.
pub struct Resolution {
	/// The last dentry reached: the target itself on a hit, or the deepest
	/// directory reached before the walk gave up on a miss.
	pub dentry: DentryHandle,
	pub found: bool,
	pub is_root: bool,
}

fn split(path: &str) -> Vec<&str> {
	path.split('/').filter(|c| !c.is_empty()).collect()
}

impl<D: Device> Mount<D> {
	/// Ensures `dentry`'s inode is loaded, reading it from disk on first
	/// descent if necessary.
	fn materialize(&mut self, dentry: DentryHandle) -> FsResult<()> {
		if self.graph.dentries.get(dentry).inode.is_some() {
			return Ok(());
		}
		let ino = self.graph.dentries.get(dentry).ino;
		let inode = self.read_inode(dentry, ino)?;
		self.graph.dentries.get_mut(dentry).inode = Some(inode);
		Ok(())
	}

	/// Resolves an absolute path to a dentry. Matches the final component by
	/// strict equality (length and content) rather than the prefix-match the
	/// on-disk format's original reader used.
	pub fn lookup(&mut self, path: &str) -> FsResult<Resolution> {
		let components = split(path);
		if components.is_empty() {
			return Ok(Resolution {
				dentry: self.root,
				found: true,
				is_root: true,
			});
		}

		let mut current = self.root;
		let total = components.len();
		for (lvl, name) in components.into_iter().enumerate() {
			self.materialize(current)?;
			let current_type = self.graph.dentries.get(current).file_type;
			if current_type != FileType::Dir {
				return Ok(Resolution {
					dentry: current,
					found: false,
					is_root: false,
				});
			}

			let inode = self.graph.dentries.get(current).inode.unwrap();
			let children = self.graph.children(inode);
			let hit = children
				.into_iter()
				.find(|&h| self.graph.dentries.get(h).name == name);

			match hit {
				Some(child) => {
					if lvl + 1 == total {
						self.materialize(child)?;
						return Ok(Resolution {
							dentry: child,
							found: true,
							is_root: false,
						});
					}
					current = child;
				}
				None => {
					return Ok(Resolution {
						dentry: current,
						found: false,
						is_root: false,
					});
				}
			}
		}
		unreachable!("loop always returns before exhausting components")
	}

	/// Resolves the parent directory of `path` and returns it along with the
	/// final path component. Used by rename and the create operations so a
	/// destination's parent is always the one actually named, never a dentry
	/// found by walking the source path.
	pub fn resolve_parent<'a>(&mut self, path: &'a str) -> FsResult<(DentryHandle, &'a str)> {
		let trimmed = path.trim_end_matches('/');
		let (parent_path, name) = match trimmed.rfind('/') {
			Some(idx) => (&trimmed[..idx], &trimmed[idx + 1..]),
			None => ("", trimmed),
		};
		let parent_path = if parent_path.is_empty() { "/" } else { parent_path };
		let res = self.lookup(parent_path)?;
		Ok((res.dentry, name))
	}
}
