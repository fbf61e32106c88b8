//! Kernel source loading.
//!
//! Each file is read whole in binary mode and gets a single `\n` appended,
//! so the length handed to the program constructor counts that byte.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{HarnessError, IoAction, Result};

/// One loaded source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSource {
    path: PathBuf,
    text: String,
}

impl KernelSource {
    /// Build from in-memory text; the trailing newline is appended here too.
    pub fn from_text(path: impl Into<PathBuf>, text: &str) -> Self {
        let mut text = text.to_owned();
        text.push('\n');
        Self {
            path: path.into(),
            text,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Source text including the appended newline.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Byte length including the appended newline.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Read one file fully and append a newline.
pub fn read_source(path: &Path) -> Result<KernelSource> {
    let mut file = File::open(path).map_err(|source| HarnessError::Io {
        action: IoAction::Open,
        path: path.to_path_buf(),
        source,
    })?;

    let size = file
        .metadata()
        .map(|m| m.len() as usize)
        .map_err(|source| HarnessError::Io {
            action: IoAction::Open,
            path: path.to_path_buf(),
            source,
        })?;

    let mut bytes = Vec::with_capacity(size + 1);
    file.read_to_end(&mut bytes).map_err(|source| HarnessError::Io {
        action: IoAction::Read,
        path: path.to_path_buf(),
        source,
    })?;
    bytes.push(b'\n');

    let text = String::from_utf8(bytes).map_err(|_| HarnessError::Encoding {
        path: path.to_path_buf(),
    })?;
    debug!("Loaded kernel source {} ({} bytes)", path.display(), text.len());

    Ok(KernelSource {
        path: path.to_path_buf(),
        text,
    })
}

/// Load every file in order. Stops at the first failure.
pub fn load_sources<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<KernelSource>> {
    paths.iter().map(|p| read_source(p.as_ref())).collect()
}
