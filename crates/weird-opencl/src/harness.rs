//! The single-kernel launch flow.
//!
//! [`Harness::run`] walks the fixed sequence select → context → load →
//! build → bind → launch → read. Every step either advances [`Stage`] or
//! aborts the run; there is no retry and no way back.

use std::fmt;

use tracing::{debug, info};

use crate::backend::{BuildOutcome, ComputeBackend, WorkSize};
use crate::config::HarnessConfig;
use crate::device;
use crate::error::{HarnessError, Result};
use crate::source;

/// Progress of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Init,
    PlatformSelected,
    DeviceSelected,
    ContextReady,
    SourceLoaded,
    ProgramBuilt,
    KernelBound,
    Launched,
    Read,
    Reported,
    Aborted,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Reported | Self::Aborted)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::PlatformSelected => "platform-selected",
            Self::DeviceSelected => "device-selected",
            Self::ContextReady => "context-ready",
            Self::SourceLoaded => "source-loaded",
            Self::ProgramBuilt => "program-built",
            Self::KernelBound => "kernel-bound",
            Self::Launched => "launched",
            Self::Read => "read",
            Self::Reported => "reported",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// What the caller asked for on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    /// 1-based platform index, possibly out of range.
    pub platform_index: i64,
    /// 1-based device index, possibly out of range.
    pub device_index: i64,
    /// Passed verbatim to the device compiler.
    pub compiler_flags: Option<String>,
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchReport {
    pub platform_name: String,
    pub device_name: String,
    pub output: Vec<u8>,
}

impl LaunchReport {
    /// The output buffer as one lowercase hex line, without the newline.
    pub fn hex(&self) -> String {
        crate::report::hex_line(&self.output)
    }
}

/// Drives one launch against a backend.
pub struct Harness<'a, B: ComputeBackend> {
    backend: &'a B,
    config: &'a HarnessConfig,
    stage: Stage,
    aborted_after: Option<Stage>,
}

impl<'a, B: ComputeBackend> Harness<'a, B> {
    pub fn new(backend: &'a B, config: &'a HarnessConfig) -> Self {
        Self {
            backend,
            config,
            stage: Stage::Init,
            aborted_after: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Last stage reached before the run aborted.
    pub fn aborted_after(&self) -> Option<Stage> {
        self.aborted_after
    }

    fn advance(&mut self, next: Stage) {
        debug!("stage {} -> {}", self.stage, next);
        self.stage = next;
    }

    /// Run the whole flow once. A harness is single-use: calling this again
    /// after a terminal stage is rejected.
    pub fn run(&mut self, request: &LaunchRequest) -> Result<LaunchReport> {
        if self.stage.is_terminal() {
            return Err(HarnessError::AlreadyFinished { stage: self.stage });
        }
        match self.run_steps(request) {
            Ok(report) => {
                self.advance(Stage::Reported);
                Ok(report)
            }
            Err(err) => {
                debug!("run aborted after stage {}: {}", self.stage, err);
                self.aborted_after = Some(self.stage);
                self.stage = Stage::Aborted;
                Err(err)
            }
        }
    }

    fn run_steps(&mut self, request: &LaunchRequest) -> Result<LaunchReport> {
        let backend = self.backend;
        let config = self.config;

        let (platform, platform_name) = device::select_platform(backend, request.platform_index)?;
        self.advance(Stage::PlatformSelected);
        let (device, device_name) =
            device::select_device(backend, &platform, request.device_index)?;
        self.advance(Stage::DeviceSelected);
        info!("Selected {} on {} via {}", device_name, platform_name, backend.name());

        let context = backend.create_context(&device)?;
        let queue = backend.create_queue(&context, &device)?;
        self.advance(Stage::ContextReady);

        // Host copies of the sources only live until the program exists.
        let mut program = {
            let sources = source::load_sources(&config.source_files)?;
            self.advance(Stage::SourceLoaded);
            backend.create_program(&context, &sources)?
        };

        let options = request.compiler_flags.as_deref();
        debug!("Building program with options {:?}", options.unwrap_or(""));
        if let BuildOutcome::Failed { log } =
            backend.build_program(&mut program, &device, options)?
        {
            return Err(HarnessError::Build { log });
        }
        let kernel = backend.create_kernel(&program, &config.kernel_name)?;
        self.advance(Stage::ProgramBuilt);

        let buffer = backend.create_output_buffer(&context, config.output_bytes)?;
        backend.set_buffer_arg(&kernel, 0, &buffer)?;
        self.advance(Stage::KernelBound);

        if config.finish_before_launch {
            backend.finish(&queue)?;
        }
        let work = WorkSize {
            global: config.global_work_size,
            local: config.local_work_size,
        };
        debug!(
            "Launching {} over {} work-items in {} group(s)",
            config.kernel_name,
            work.global,
            work.work_groups()
        );
        backend.enqueue_kernel(&queue, &kernel, work)?;
        backend.finish(&queue)?;
        self.advance(Stage::Launched);

        let mut output = vec![0u8; config.output_bytes];
        backend.read_buffer(&queue, &buffer, &mut output)?;
        backend.finish(&queue)?;
        self.advance(Stage::Read);

        info!(
            "{} finished on {} ({} bytes read back)",
            config.kernel_name,
            device_name,
            output.len()
        );
        Ok(LaunchReport {
            platform_name,
            device_name,
            output,
        })
    }
}

/// Convenience wrapper: one run with a fresh [`Harness`].
pub fn launch<B: ComputeBackend>(
    backend: &B,
    config: &HarnessConfig,
    request: &LaunchRequest,
) -> Result<LaunchReport> {
    Harness::new(backend, config).run(request)
}
