//! Single-kernel OpenCL launch harness.
//!
//! Selects a platform and device by 1-based index, compiles kernel source
//! at runtime, launches one 1-D range, and reads the output buffer back:
//!
//! - [`device`]: enumeration and index validation
//! - [`source`]: kernel source loading
//! - [`harness`]: the launch flow and its [`Stage`] tracking
//! - [`backend`]: the runtime seam, with [`ScriptedBackend`] in memory and
//!   `OpenClBackend` behind the `opencl` feature
//! - [`config`]: TOML + `WEIRD_*` environment configuration

pub mod backend;
pub mod config;
pub mod device;
pub mod error;
pub mod harness;
#[cfg(feature = "opencl")]
pub mod opencl;
pub mod report;
pub mod scripted;
pub mod source;

pub use backend::{BuildOutcome, ComputeBackend, WorkSize};
pub use config::{ConfigError, HarnessConfig, LogFormat};
pub use device::{parse_index, MAX_ENTRIES};
pub use error::{HarnessError, Result, SelectionKind, EXIT_FAILURE, EXIT_SUCCESS};
pub use harness::{launch, Harness, LaunchReport, LaunchRequest, Stage};
#[cfg(feature = "opencl")]
pub use opencl::OpenClBackend;
pub use report::hex_line;
pub use scripted::{ScriptedBackend, ScriptedPlatform};
pub use source::{load_sources, KernelSource};
