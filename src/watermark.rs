//! The watermark store: two idempotent methods deciding how the subscription's resumable
//! position survives a crash. The engine writes through on every successful poll.

use std::{
	io::Write,
	path::{Path, PathBuf},
	sync::atomic::{AtomicU64, Ordering},
};

use anyhow::{Context, Result};

use crate::transaction::Round;

#[cfg_attr(test, mockall::automock)]
pub trait WatermarkStore: Send + Sync {
	/// The largest round fully processed, or 0 when nothing has been processed yet.
	fn load(&self) -> Result<Round>;

	fn save(&self, watermark: Round) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryWatermarkStore {
	watermark: AtomicU64,
}

impl InMemoryWatermarkStore {
	pub fn new(watermark: Round) -> Self {
		Self { watermark: AtomicU64::new(watermark) }
	}
}

impl WatermarkStore for InMemoryWatermarkStore {
	fn load(&self) -> Result<Round> {
		Ok(self.watermark.load(Ordering::SeqCst))
	}

	fn save(&self, watermark: Round) -> Result<()> {
		self.watermark.store(watermark, Ordering::SeqCst);
		Ok(())
	}
}

/// Persists the watermark as decimal text, written to a temporary sibling and renamed into
/// place so a crash mid-write cannot corrupt the stored value.
pub struct FileWatermarkStore {
	path: PathBuf,
}

impl FileWatermarkStore {
	pub fn new(path: impl AsRef<Path>) -> Self {
		Self { path: path.as_ref().to_path_buf() }
	}
}

impl WatermarkStore for FileWatermarkStore {
	fn load(&self) -> Result<Round> {
		match std::fs::read_to_string(&self.path) {
			Ok(contents) => contents
				.trim()
				.parse::<Round>()
				.with_context(|| format!("corrupt watermark file {}", self.path.display())),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
			Err(e) => {
				Err(e).with_context(|| format!("reading watermark file {}", self.path.display()))
			},
		}
	}

	fn save(&self, watermark: Round) -> Result<()> {
		let tmp_path = self.path.with_extension("tmp");
		{
			let mut tmp = std::fs::File::create(&tmp_path)
				.with_context(|| format!("creating {}", tmp_path.display()))?;
			write!(tmp, "{watermark}")?;
			tmp.sync_all()?;
		}
		std::fs::rename(&tmp_path, &self.path)
			.with_context(|| format!("renaming into {}", self.path.display()))?;
		Ok(())
	}
}
