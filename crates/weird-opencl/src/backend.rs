//! Runtime seam between the harness flow and a compute runtime.
//!
//! Every call the harness makes into the runtime goes through
//! [`ComputeBackend`]. Handles are associated types so each backend keeps
//! its own owned wrappers; the harness threads them through the run and
//! drops them when it returns.

use crate::error::Result;
use crate::source::KernelSource;

/// One-dimensional launch geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkSize {
    pub global: usize,
    pub local: usize,
}

impl WorkSize {
    pub fn work_groups(&self) -> usize {
        self.global / self.local
    }
}

/// Result of a program build that completed its runtime calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Built,
    /// The compiler rejected the program; `log` is the device build log.
    Failed { log: String },
}

/// Runtime operations used by the single-kernel launch flow.
///
/// Errors are reported as [`HarnessError::Runtime`](crate::HarnessError)
/// naming the runtime call that failed.
pub trait ComputeBackend {
    type Platform;
    type Device;
    type Context;
    type Queue;
    type Program;
    type Kernel;
    type Buffer;

    /// Short backend name for logging.
    fn name(&self) -> &'static str;

    /// All platforms visible to the runtime, in runtime order.
    fn platforms(&self) -> Result<Vec<Self::Platform>>;

    /// All devices of any type on `platform`, in runtime order.
    fn devices(&self, platform: &Self::Platform) -> Result<Vec<Self::Device>>;

    fn platform_name(&self, platform: &Self::Platform) -> String;

    fn device_name(&self, device: &Self::Device) -> String;

    /// Context owning exactly `device`.
    fn create_context(&self, device: &Self::Device) -> Result<Self::Context>;

    /// Default in-order, non-profiling queue.
    fn create_queue(&self, context: &Self::Context, device: &Self::Device)
        -> Result<Self::Queue>;

    /// Program object from the ordered sources. Host copies may be dropped
    /// as soon as this returns.
    fn create_program(
        &self,
        context: &Self::Context,
        sources: &[KernelSource],
    ) -> Result<Self::Program>;

    /// Synchronous build for `device`. A compiler rejection is
    /// `Ok(BuildOutcome::Failed { .. })`; a failure to fetch the log is an
    /// error.
    fn build_program(
        &self,
        program: &mut Self::Program,
        device: &Self::Device,
        options: Option<&str>,
    ) -> Result<BuildOutcome>;

    fn create_kernel(&self, program: &Self::Program, name: &str) -> Result<Self::Kernel>;

    /// Device buffer of `len` bytes that only the kernel writes.
    fn create_output_buffer(&self, context: &Self::Context, len: usize) -> Result<Self::Buffer>;

    fn set_buffer_arg(&self, kernel: &Self::Kernel, index: u32, buffer: &Self::Buffer)
        -> Result<()>;

    /// Block until every command submitted to `queue` has completed.
    fn finish(&self, queue: &Self::Queue) -> Result<()>;

    fn enqueue_kernel(&self, queue: &Self::Queue, kernel: &Self::Kernel, work: WorkSize)
        -> Result<()>;

    /// Blocking read of the whole buffer into `out`.
    fn read_buffer(&self, queue: &Self::Queue, buffer: &Self::Buffer, out: &mut [u8])
        -> Result<()>;
}

/// Runtime call names used in diagnostics.
pub mod call {
    pub const GET_PLATFORM_IDS: &str = "clGetPlatformIDs";
    pub const GET_DEVICE_IDS: &str = "clGetDeviceIDs";
    pub const CREATE_CONTEXT: &str = "clCreateContext";
    pub const CREATE_COMMAND_QUEUE: &str = "clCreateCommandQueueWithProperties";
    pub const CREATE_PROGRAM: &str = "clCreateProgramWithSource";
    pub const BUILD_PROGRAM: &str = "clBuildProgram";
    pub const GET_BUILD_INFO: &str = "clGetProgramBuildInfo";
    pub const CREATE_KERNEL: &str = "clCreateKernel";
    pub const CREATE_BUFFER: &str = "clCreateBuffer";
    pub const SET_KERNEL_ARG: &str = "clSetKernelArg";
    pub const FINISH: &str = "clFinish";
    pub const ENQUEUE_ND_RANGE: &str = "clEnqueueNDRangeKernel";
    pub const ENQUEUE_READ_BUFFER: &str = "clEnqueueReadBuffer";
}
