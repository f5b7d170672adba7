use std::path::{Path, PathBuf};

use super::{compress_atomically, copy_chunked, CompressionStrategy};
use crate::Result;

const DEFAULT_ZSTD_LEVEL: i32 = 3;

/// Single-frame zstd. Unlike seekable block archives, rotated log files are
/// only ever read front to back, so one frame is enough.
#[derive(Debug, Clone, Copy)]
pub struct ZstdCompression {
    level: i32,
}

impl ZstdCompression {
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Default for ZstdCompression {
    fn default() -> Self {
        Self::new(DEFAULT_ZSTD_LEVEL)
    }
}

impl CompressionStrategy for ZstdCompression {
    fn extension(&self) -> &str {
        ".zst"
    }

    fn compress(&self, path: &Path) -> Result<PathBuf> {
        let level = self.level;
        compress_atomically(path, self.extension(), |input, output| {
            let mut encoder = zstd::stream::write::Encoder::new(output, level)?;
            copy_chunked(input, &mut encoder)?;
            encoder.finish()
        })
    }
}
