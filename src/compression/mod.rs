//! Rotation-time compression of closed stream files.
//!
//! A strategy turns `<name>` into `<name><suffix>`. Output goes to
//! `<name><suffix>.tmp` first and is renamed into place after a successful
//! sync; the source is removed only after the rename. Any failure leaves the
//! source untouched.

#[cfg(feature = "zstd")]
mod zstd;

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[cfg(feature = "zstd")]
pub use self::zstd::ZstdCompression;

/// Read/write chunk used when streaming a file through an encoder.
pub const CHUNK_SIZE: usize = 64 * 1024;

pub trait CompressionStrategy: Send + Sync {
    /// Suffix appended to the compressed file's name, e.g. `.gz`.
    fn extension(&self) -> &str;

    /// Compresses `path` in place and returns the compressed sibling.
    fn compress(&self, path: &Path) -> Result<PathBuf>;
}

/// Codec selection as it appears in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionCodec {
    #[default]
    Gzip,
    Zstd,
    None,
}

impl CompressionCodec {
    pub fn strategy(self) -> Result<Arc<dyn CompressionStrategy>> {
        match self {
            CompressionCodec::Gzip => Ok(Arc::new(GzipCompression::default())),
            #[cfg(feature = "zstd")]
            CompressionCodec::Zstd => Ok(Arc::new(ZstdCompression::default())),
            #[cfg(not(feature = "zstd"))]
            CompressionCodec::Zstd => Err(Error::InvalidConfig(
                "zstd compression requires the `zstd` feature".to_string(),
            )),
            CompressionCodec::None => Ok(Arc::new(NoCompression)),
        }
    }
}

/// gzip via `flate2`.
#[derive(Debug, Clone, Copy)]
pub struct GzipCompression {
    level: u32,
}

impl GzipCompression {
    pub fn new(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }
}

impl Default for GzipCompression {
    fn default() -> Self {
        Self::new(6)
    }
}

impl CompressionStrategy for GzipCompression {
    fn extension(&self) -> &str {
        ".gz"
    }

    fn compress(&self, path: &Path) -> Result<PathBuf> {
        let level = flate2::Compression::new(self.level);
        compress_atomically(path, self.extension(), |input, output| {
            let mut encoder = GzEncoder::new(output, level);
            copy_chunked(input, &mut encoder)?;
            encoder.finish()
        })
    }
}

/// Leaves files as they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompression;

impl CompressionStrategy for NoCompression {
    fn extension(&self) -> &str {
        ""
    }

    fn compress(&self, path: &Path) -> Result<PathBuf> {
        Ok(path.to_path_buf())
    }
}

/// `<path><suffix>` without touching any existing extension.
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

pub(crate) fn copy_chunked<R: Read, W: Write>(input: &mut R, output: &mut W) -> io::Result<u64> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        output.write_all(&buf[..n])?;
        total += n as u64;
    }
    Ok(total)
}

/// Runs `encode` from `src` into a temp sibling, then publishes it as
/// `<src><suffix>` and removes `src`.
pub(crate) fn compress_atomically<F>(src: &Path, suffix: &str, encode: F) -> Result<PathBuf>
where
    F: FnOnce(&mut File, File) -> io::Result<File>,
{
    let dst = with_suffix(src, suffix);
    let tmp = with_suffix(src, &format!("{suffix}.tmp"));
    let _ = fs::remove_file(&tmp);

    let written = (|| -> io::Result<()> {
        let mut input = File::open(src)?;
        let output = File::create(&tmp)?;
        let output = encode(&mut input, output)?;
        output.sync_all()?;
        fs::rename(&tmp, &dst)
    })();

    if let Err(err) = written {
        let _ = fs::remove_file(&tmp);
        return Err(compression_error(src, err));
    }

    // Only remove the source once the archive is in place; if that fails,
    // drop the archive so the raw file stays the single copy.
    if let Err(err) = fs::remove_file(src) {
        let _ = fs::remove_file(&dst);
        return Err(compression_error(src, err));
    }
    Ok(dst)
}

fn compression_error(src: &Path, err: io::Error) -> Error {
    Error::Compression {
        path: src.display().to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use tempfile::TempDir;

    #[test]
    fn test_gzip_replaces_source() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("log_000.txt");
        let body = b"line one\nline two\n".repeat(5_000);
        fs::write(&src, &body)?;

        let dst = GzipCompression::default().compress(&src)?;

        assert_eq!(dst, dir.path().join("log_000.txt.gz"));
        assert!(!src.exists(), "source should be removed");
        assert!(!with_suffix(&src, ".gz.tmp").exists());

        let mut decoded = Vec::new();
        GzDecoder::new(File::open(&dst)?).read_to_end(&mut decoded)?;
        assert_eq!(decoded, body);
        Ok(())
    }

    #[test]
    fn test_missing_source_is_reported_and_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("gone.txt");
        let err = GzipCompression::default().compress(&src).unwrap_err();
        assert!(matches!(err, Error::Compression { .. }));
        assert!(!with_suffix(&src, ".gz").exists());
        assert!(!with_suffix(&src, ".gz.tmp").exists());
    }

    #[test]
    fn test_cleans_up_stale_tmp() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("bin_000.bin");
        fs::write(&src, b"payload")?;
        fs::write(with_suffix(&src, ".gz.tmp"), b"old")?;

        GzipCompression::new(1).compress(&src)?;

        assert!(!with_suffix(&src, ".gz.tmp").exists());
        assert!(with_suffix(&src, ".gz").exists());
        Ok(())
    }

    #[test]
    fn test_codec_selection() {
        assert_eq!(CompressionCodec::Gzip.strategy().unwrap().extension(), ".gz");
        assert_eq!(CompressionCodec::None.strategy().unwrap().extension(), "");
        let parsed: CompressionCodec = serde_json::from_str("\"zstd\"").unwrap();
        assert_eq!(parsed, CompressionCodec::Zstd);
    }
}
