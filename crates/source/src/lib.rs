use anyhow::Context;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Lines, Read};
use std::path::Path;
use tracing::debug;

/// Newline-delimited lines from a log archive, decompressed transparently.
/// Opening errors are fail-fast; a decode error mid-stream surfaces as the
/// failing line's `io::Error`.
pub struct LineSource {
    lines: Lines<Box<dyn BufRead>>,
}

impl LineSource {
    /// Opens `path`, layering gzip decompression for `.gz` archives.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        if path.extension().is_some_and(|ext| ext == "gz") {
            debug!("reading {} as gzip", path.display());
            Ok(Self::from_reader(GzDecoder::new(file)))
        } else {
            Ok(Self::from_reader(file))
        }
    }

    /// Reads uncompressed lines from standard input.
    pub fn stdin() -> Self {
        Self::from_reader(io::stdin())
    }

    pub fn from_reader(reader: impl Read + 'static) -> Self {
        let reader: Box<dyn BufRead> = Box::new(BufReader::new(reader));
        Self {
            lines: reader.lines(),
        }
    }
}

impl std::fmt::Debug for LineSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineSource").finish_non_exhaustive()
    }
}

impl Iterator for LineSource {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.lines.next()
    }
}
