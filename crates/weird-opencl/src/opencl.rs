//! OpenCL runtime backend.
//!
//! Implements [`ComputeBackend`] on top of the `opencl3` crate and the
//! system ICD loader. Handles are the `opencl3` owning wrappers, so every
//! CL object is released when the harness drops it.

use std::cell::Cell;
use std::ptr;

use opencl3::command_queue::CommandQueue;
use opencl3::context::Context;
use opencl3::device::{Device, CL_DEVICE_TYPE_ALL};
use opencl3::kernel::{ExecuteKernel, Kernel};
use opencl3::memory::{Buffer, ClMem, CL_MEM_WRITE_ONLY};
use opencl3::platform::{get_platforms, Platform};
use opencl3::program::Program;
use opencl3::types::{cl_mem, CL_BLOCKING};
use tracing::{debug, warn};

use crate::backend::{call, BuildOutcome, ComputeBackend, WorkSize};
use crate::error::{HarnessError, Result};
use crate::source::KernelSource;

/// Backend that talks to the installed OpenCL runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenClBackend;

impl OpenClBackend {
    pub fn new() -> Self {
        Self
    }
}

/// Kernel handle that remembers the buffer bound to argument 0, so the
/// launch can hand it to [`ExecuteKernel`] again.
#[derive(Debug)]
pub struct OpenClKernel {
    kernel: Kernel,
    output: Cell<Option<cl_mem>>,
}

impl ComputeBackend for OpenClBackend {
    type Platform = Platform;
    type Device = Device;
    type Context = Context;
    type Queue = CommandQueue;
    type Program = Program;
    type Kernel = OpenClKernel;
    type Buffer = Buffer<u8>;

    fn name(&self) -> &'static str {
        "opencl"
    }

    fn platforms(&self) -> Result<Vec<Platform>> {
        get_platforms().map_err(|e| HarnessError::runtime(call::GET_PLATFORM_IDS, e))
    }

    fn devices(&self, platform: &Platform) -> Result<Vec<Device>> {
        let ids = platform
            .get_devices(CL_DEVICE_TYPE_ALL)
            .map_err(|e| HarnessError::runtime(call::GET_DEVICE_IDS, e))?;
        Ok(ids.into_iter().map(Device::new).collect())
    }

    fn platform_name(&self, platform: &Platform) -> String {
        platform.name().unwrap_or_default()
    }

    fn device_name(&self, device: &Device) -> String {
        device.name().unwrap_or_default()
    }

    fn create_context(&self, device: &Device) -> Result<Context> {
        Context::from_device(device).map_err(|e| HarnessError::runtime(call::CREATE_CONTEXT, e))
    }

    fn create_queue(&self, context: &Context, _device: &Device) -> Result<CommandQueue> {
        // The context owns exactly one device, which is its default device.
        // Needs an OpenCL 2.0 host runtime.
        CommandQueue::create_default_with_properties(context, 0, 0)
            .map_err(|e| HarnessError::runtime(call::CREATE_COMMAND_QUEUE, e))
    }

    fn create_program(&self, context: &Context, sources: &[KernelSource]) -> Result<Program> {
        let texts: Vec<&str> = sources.iter().map(KernelSource::text).collect();
        Program::create_from_sources(context, &texts)
            .map_err(|e| HarnessError::runtime(call::CREATE_PROGRAM, e))
    }

    fn build_program(
        &self,
        program: &mut Program,
        device: &Device,
        options: Option<&str>,
    ) -> Result<BuildOutcome> {
        match program.build(&[device.id()], options.unwrap_or("")) {
            Ok(()) => Ok(BuildOutcome::Built),
            Err(status) => {
                warn!("{} returned {}", call::BUILD_PROGRAM, status);
                let log = program
                    .get_build_log(device.id())
                    .map_err(|e| HarnessError::runtime(call::GET_BUILD_INFO, e))?;
                Ok(BuildOutcome::Failed { log })
            }
        }
    }

    fn create_kernel(&self, program: &Program, name: &str) -> Result<OpenClKernel> {
        let kernel =
            Kernel::create(program, name).map_err(|e| HarnessError::runtime(call::CREATE_KERNEL, e))?;
        Ok(OpenClKernel {
            kernel,
            output: Cell::new(None),
        })
    }

    fn create_output_buffer(&self, context: &Context, len: usize) -> Result<Buffer<u8>> {
        // SAFETY: no host pointer is supplied, the runtime allocates the storage.
        unsafe { Buffer::<u8>::create(context, CL_MEM_WRITE_ONLY, len, ptr::null_mut()) }
            .map_err(|e| HarnessError::runtime(call::CREATE_BUFFER, e))
    }

    fn set_buffer_arg(&self, kernel: &OpenClKernel, index: u32, buffer: &Buffer<u8>) -> Result<()> {
        let mem = buffer.get();
        // SAFETY: the argument is a live cl_mem of the size the kernel expects.
        unsafe { kernel.kernel.set_arg(index, &mem) }
            .map_err(|e| HarnessError::runtime(call::SET_KERNEL_ARG, e))?;
        if index == 0 {
            kernel.output.set(Some(mem));
        }
        Ok(())
    }

    fn finish(&self, queue: &CommandQueue) -> Result<()> {
        queue.finish().map_err(|e| HarnessError::runtime(call::FINISH, e))
    }

    fn enqueue_kernel(&self, queue: &CommandQueue, kernel: &OpenClKernel, work: WorkSize) -> Result<()> {
        let output = kernel
            .output
            .get()
            .ok_or_else(|| HarnessError::runtime(call::ENQUEUE_ND_RANGE, "CL_INVALID_KERNEL_ARGS"))?;
        debug!("{} global={} local={}", call::ENQUEUE_ND_RANGE, work.global, work.local);
        // SAFETY: `output` is the cl_mem bound in `set_buffer_arg`; the buffer
        // outlives the launch because the harness drops it after the read.
        let _event = unsafe {
            ExecuteKernel::new(&kernel.kernel)
                .set_arg(&output)
                .set_global_work_size(work.global)
                .set_local_work_size(work.local)
                .enqueue_nd_range(queue)
        }
        .map_err(|e| HarnessError::runtime(call::ENQUEUE_ND_RANGE, e))?;
        Ok(())
    }

    fn read_buffer(&self, queue: &CommandQueue, buffer: &Buffer<u8>, out: &mut [u8]) -> Result<()> {
        // SAFETY: blocking read, `out` stays borrowed until the copy completes.
        let _event = unsafe { queue.enqueue_read_buffer(buffer, CL_BLOCKING, 0, out, &[]) }
            .map_err(|e| HarnessError::runtime(call::ENQUEUE_READ_BUFFER, e))?;
        Ok(())
    }
}
