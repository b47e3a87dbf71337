use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::AppError;

lazy_static! {
    static ref SEQUENCE_NAME: Regex = Regex::new(r"^output(?:_(\d+))?\.wav$").unwrap();
}

/// Allocates destination paths for persisted audio in a single output
/// directory.
///
/// Caller-supplied names are used verbatim (naming, and any overwrite, is the
/// caller's responsibility). Unnamed allocations continue the
/// `output.wav`, `output_1.wav`, ... sequence; the scan and the file creation
/// happen under one lock so concurrent allocations cannot hand out the same
/// index.
pub struct OutputAllocator {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl OutputAllocator {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            lock: Mutex::new(()),
        }
    }

    pub fn allocate(&self, requested: Option<&str>) -> Result<PathBuf, AppError> {
        if let Some(name) = requested.map(str::trim).filter(|n| !n.is_empty()) {
            let file_name = if name.ends_with(".wav") {
                name.to_string()
            } else {
                format!("{}.wav", name)
            };
            return Ok(self.dir.join(file_name));
        }

        let _guard = self.lock.lock().unwrap();

        let next = self.next_index()?;
        let path = match next {
            None => self.dir.join("output.wav"),
            Some(n) => self.dir.join(format!("output_{}.wav", n)),
        };

        // Claim the name before releasing the lock.
        fs::File::create(&path)?;
        Ok(path)
    }

    /// `None` when the sequence is empty, otherwise max existing index + 1
    /// (`output.wav` counts as index 0).
    fn next_index(&self) -> Result<Option<u32>, AppError> {
        let mut max: Option<u32> = None;

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(caps) = SEQUENCE_NAME.captures(&name.to_string_lossy()) else {
                continue;
            };
            let index = caps
                .get(1)
                .map(|m| m.as_str().parse().unwrap_or(0))
                .unwrap_or(0);
            max = Some(max.map_or(index, |m| m.max(index)));
        }

        Ok(max.map(|m| m + 1))
    }
}
