//! End-to-end tests driving the namespace façade against an in-memory device,
//! covering the fresh-mount, read/write, remount, per-file cap, rmdir and
//! rename scenarios.

use std::fs::File;
use std::fs::OpenOptions;

use fscore::FileDevice;
use fscore::FileType;
use fscore::MemDevice;
use fscore::Mount;

const IO_UNIT: u32 = 512;
const BLOCK_SIZE: u64 = (IO_UNIT * 2) as u64;
// super(1) + ino_map(1) + data_map(1) + ino_table(585) + data(3508) blocks.
const DEVICE_BLOCKS: u64 = 1 + 1 + 1 + 585 + 3508;

fn fresh_device() -> MemDevice {
	MemDevice::new(DEVICE_BLOCKS * BLOCK_SIZE, IO_UNIT)
}

#[test]
fn s1_fresh_mount_has_only_root() {
	let mount = Mount::mount(fresh_device()).unwrap();
	assert_eq!(mount.usage(), 0);
	let _ = mount.unmount().unwrap();
}

#[test]
fn s2_mkdir_mknod_write_getattr_readdir() {
	let mut mount = Mount::mount(fresh_device()).unwrap();
	mount.mkdir("/a").unwrap();
	mount.mknod("/a/b").unwrap();
	let n = mount.write("/a/b", 0, b"hello").unwrap();
	assert_eq!(n, 5);

	let attr = mount.getattr("/a/b").unwrap();
	assert_eq!(attr.size, 5);
	assert_eq!(attr.file_type, FileType::Reg);

	let entry = mount.readdir("/a", 0).unwrap().unwrap();
	assert_eq!(entry.name, "b");
	assert!(mount.readdir("/a", 1).unwrap().is_none());

	mount.unmount().unwrap();
}

#[test]
fn s3_unmount_remount_roundtrips_file_content() {
	let mut mount = Mount::mount(fresh_device()).unwrap();
	mount.mkdir("/a").unwrap();
	mount.mknod("/a/b").unwrap();
	mount.write("/a/b", 0, b"hello").unwrap();
	let device = mount.unmount().unwrap();

	let mut mount = Mount::mount(device).unwrap();
	let mut buf = [0u8; 5];
	let n = mount.read("/a/b", 0, &mut buf).unwrap();
	assert_eq!(n, 5);
	assert_eq!(&buf, b"hello");
	mount.unmount().unwrap();
}

#[test]
fn s4_write_fills_file_then_next_block_is_rejected() {
	let mut mount = Mount::mount(fresh_device()).unwrap();
	mount.mknod("/f").unwrap();
	let full = vec![0xABu8; 6 * BLOCK_SIZE as usize];
	mount.write("/f", 0, &full).unwrap();
	let err = mount.write("/f", 6 * BLOCK_SIZE, b"x").unwrap_err();
	assert!(matches!(err, fscore::FsError::NoSpace));
	mount.unmount().unwrap();
}

#[test]
fn s5_rmdir_clears_children() {
	let mut mount = Mount::mount(fresh_device()).unwrap();
	mount.mkdir("/d").unwrap();
	mount.mknod("/d/x").unwrap();
	mount.rmdir("/d").unwrap();
	assert!(matches!(
		mount.getattr("/d").unwrap_err(),
		fscore::FsError::NotFound
	));
	assert!(mount.readdir("/", 0).unwrap().is_none());
	mount.unmount().unwrap();
}

#[test]
fn s6_rename_moves_file() {
	let mut mount = Mount::mount(fresh_device()).unwrap();
	mount.mknod("/a").unwrap();
	mount.rename("/a", "/b").unwrap();
	assert!(matches!(
		mount.getattr("/a").unwrap_err(),
		fscore::FsError::NotFound
	));
	assert!(mount.getattr("/b").is_ok());
	mount.unmount().unwrap();
}

#[test]
fn p3_dir_size_matches_child_count() {
	let mut mount = Mount::mount(fresh_device()).unwrap();
	mount.mkdir("/a").unwrap();
	mount.mknod("/a/x").unwrap();
	mount.mknod("/a/y").unwrap();
	let attr = mount.getattr("/a").unwrap();
	assert_eq!(attr.file_type, FileType::Dir);
	assert_eq!(attr.size, 2 * fscore::layout::DentryDisk::size() as u64);
	let mut count = 0;
	while mount.readdir("/a", count).unwrap().is_some() {
		count += 1;
	}
	assert_eq!(count, 2);

	mount.unlink("/a/x").unwrap();
	let attr = mount.getattr("/a").unwrap();
	assert_eq!(attr.size, fscore::layout::DentryDisk::size() as u64);
	mount.unmount().unwrap();
}

#[test]
fn lookup_uses_strict_name_equality() {
	let mut mount = Mount::mount(fresh_device()).unwrap();
	mount.mknod("/ab").unwrap();
	assert!(matches!(
		mount.getattr("/a").unwrap_err(),
		fscore::FsError::NotFound
	));
	mount.unmount().unwrap();
}

#[test]
fn write_past_end_of_file_is_seek_error() {
	let mut mount = Mount::mount(fresh_device()).unwrap();
	mount.mknod("/f").unwrap();
	let err = mount.write("/f", 10, b"x").unwrap_err();
	assert!(matches!(err, fscore::FsError::Seek));
	mount.unmount().unwrap();
}

#[test]
fn file_device_exercises_real_block_alignment() {
	let path = std::env::temp_dir().join(format!("fscore-test-{}.img", std::process::id()));
	{
		let file: File = OpenOptions::new()
			.create(true)
			.write(true)
			.truncate(true)
			.open(&path)
			.unwrap();
		file.set_len(DEVICE_BLOCKS * BLOCK_SIZE).unwrap();
	}

	let device = FileDevice::open(&path).unwrap();
	let mut mount = Mount::mount(device).unwrap();
	mount.mknod("/f").unwrap();
	mount.write("/f", 0, b"hello, block device").unwrap();
	mount.unmount().unwrap();

	let device = FileDevice::open(&path).unwrap();
	let mut mount = Mount::mount(device).unwrap();
	let mut buf = [0u8; 19];
	mount.read("/f", 0, &mut buf).unwrap();
	assert_eq!(&buf, b"hello, block device");
	mount.unmount().unwrap();

	std::fs::remove_file(&path).unwrap();
}

#[test]
fn truncate_growing_with_no_prior_write_updates_block_count() {
	let mut mount = Mount::mount(fresh_device()).unwrap();
	mount.mknod("/f").unwrap();
	mount.truncate("/f", 3 * BLOCK_SIZE).unwrap();
	let attr = mount.getattr("/f").unwrap();
	assert_eq!(attr.size, 3 * BLOCK_SIZE);
	assert_eq!(attr.blocks, 3);
	mount.unmount().unwrap();
}

#[test]
fn unlink_on_directory_is_isdir() {
	let mut mount = Mount::mount(fresh_device()).unwrap();
	mount.mkdir("/d").unwrap();
	let err = mount.unlink("/d").unwrap_err();
	assert!(matches!(err, fscore::FsError::IsDir));
	mount.unmount().unwrap();
}
