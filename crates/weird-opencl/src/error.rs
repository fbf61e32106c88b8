//! Error types for the launch harness.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::harness::Stage;

/// Exit status for a completed run.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit status for every failure class.
pub const EXIT_FAILURE: i32 = 1;

/// Which enumeration an index selects from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionKind {
    Platform,
    Device,
}

impl fmt::Display for SelectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Platform => write!(f, "platform"),
            Self::Device => write!(f, "device"),
        }
    }
}

/// File operation that failed while loading kernel sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoAction {
    Open,
    Read,
}

impl fmt::Display for IoAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Read => write!(f, "read from"),
        }
    }
}

/// Errors produced while selecting, building and launching the kernel.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("USAGE: {program} platform device [ compiler_flags ]")]
    Usage { program: String },

    #[error("ERROR: {kind} should be between 1 and {count}, inclusive, got {index}")]
    IndexOutOfRange {
        kind: SelectionKind,
        count: usize,
        index: i64,
    },

    #[error("cannot {action} file {}: {source}", .path.display())]
    Io {
        action: IoAction,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("kernel source {} is not valid UTF-8", .path.display())]
    Encoding { path: PathBuf },

    /// A runtime call returned a non-success status.
    #[error("{call} failed ({reason})")]
    Runtime { call: &'static str, reason: String },

    /// The device compiler rejected the program. `log` is the raw build log.
    #[error("program build failed")]
    Build { log: String },

    #[error("{backend} support is not compiled in (rebuild with --features opencl)")]
    BackendUnavailable { backend: &'static str },

    /// `Harness::run` was called on a harness that already finished.
    #[error("harness already finished at stage {stage}")]
    AlreadyFinished { stage: Stage },

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl HarnessError {
    /// Wrap a failed runtime call, keeping the runtime's own status text.
    pub fn runtime(call: &'static str, reason: impl fmt::Display) -> Self {
        Self::Runtime {
            call,
            reason: reason.to_string(),
        }
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        EXIT_FAILURE
    }

    /// The compiler log when this is a build failure.
    pub fn build_log(&self) -> Option<&str> {
        match self {
            Self::Build { log } => Some(log),
            _ => None,
        }
    }
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, HarnessError>;
