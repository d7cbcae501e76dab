//! Formats a device (or plain file) with a fresh filesystem image, or reports
//! on one that already carries our magic number.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;
use std::process::exit;

use clap::Parser;
use fscore::FileDevice;
use fscore::Mount;
use log::info;
use utils::prompt::prompt;

#[derive(Parser)]
#[command(name = "mkfs", about = "Format a device with a fresh filesystem image")]
struct Args {
	/// Path to the device file (or a plain file to use as a disk image).
	device: PathBuf,

	/// Format even if the device already carries a recognized filesystem.
	#[arg(short, long)]
	force: bool,

	/// Enable debug logging.
	#[arg(short, long)]
	verbose: bool,
}

fn is_present(path: &Path) -> std::io::Result<bool> {
	let mut file = File::open(path)?;
	let mut magic = [0u8; 4];
	if file.read_exact(&mut magic).is_err() {
		return Ok(false);
	}
	Ok(u32::from_ne_bytes(magic) == fscore::layout::MAGIC)
}

fn main() {
	let args = Args::parse();

	let level = if args.verbose { "debug" } else { "warn" };
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

	let already_present = is_present(&args.device).unwrap_or_else(|e| {
		eprintln!("mkfs: {}: {e}", args.device.display());
		exit(1);
	});

	if already_present && !args.force {
		println!("{} already contains a recognized filesystem.", args.device.display());
		let confirm = prompt(Some("Format anyway? (y/N) "), false)
			.map(|s| s.to_lowercase() == "y")
			.unwrap_or(false);
		if !confirm {
			eprintln!("Abort.");
			exit(1);
		}
	}

	if already_present {
		// Zero the magic so `Mount::mount` treats this as a fresh device
		// instead of trying to interpret a stale (and possibly incompatible)
		// layout.
		if let Err(e) = std::fs::OpenOptions::new()
			.write(true)
			.open(&args.device)
			.and_then(|mut f| {
				use std::io::Write;
				f.write_all(&[0u8; 4])
			}) {
			eprintln!("mkfs: {}: {e}", args.device.display());
			exit(1);
		}
	}

	let device = FileDevice::open(&args.device).unwrap_or_else(|e| {
		eprintln!("mkfs: {}: {e}", args.device.display());
		exit(1);
	});

	let mount = Mount::mount(device).unwrap_or_else(|e| {
		eprintln!("mkfs: failed to initialize filesystem: {e}");
		exit(1);
	});
	info!("formatted {}", args.device.display());
	mount.unmount().unwrap_or_else(|e| {
		eprintln!("mkfs: failed to write filesystem: {e}");
		exit(1);
	});

	println!("{}: filesystem created.", args.device.display());
}
