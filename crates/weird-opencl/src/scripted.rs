//! Deterministic in-memory runtime.
//!
//! [`ScriptedBackend`] answers every [`ComputeBackend`] call from a fixed
//! script: a platform/device table, an optional compiler rejection, an
//! optional failing call, and a kernel model that writes one byte per
//! work-item. It records each runtime call it receives, which lets tests
//! drive the whole launch flow without an OpenCL installation.

use std::cell::RefCell;
use std::rc::Rc;

use crate::backend::{call, BuildOutcome, ComputeBackend, WorkSize};
use crate::error::{HarnessError, Result};
use crate::source::KernelSource;

/// Byte written by work-item `gid`.
pub type KernelModel = fn(usize) -> u8;

/// Default kernel model: a fixed byte pattern derived from the work-item id.
pub fn default_model(gid: usize) -> u8 {
    (gid as u8).wrapping_mul(37).wrapping_add(0x5a)
}

/// A platform in the script.
#[derive(Debug, Clone)]
pub struct ScriptedPlatform {
    pub name: String,
    pub devices: Vec<String>,
}

impl ScriptedPlatform {
    pub fn new(name: &str, devices: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            devices: devices.iter().map(|d| d.to_string()).collect(),
        }
    }
}

type Bytes = Rc<RefCell<Vec<u8>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptedDevice {
    pub platform: usize,
    pub index: usize,
}

#[derive(Debug)]
pub struct ScriptedContext {
    device: ScriptedDevice,
}

#[derive(Debug)]
pub struct ScriptedQueue {
    device: ScriptedDevice,
}

#[derive(Debug)]
pub struct ScriptedProgram {
    sources: Vec<String>,
    built: bool,
}

#[derive(Debug)]
pub struct ScriptedKernel {
    name: String,
    arg0: RefCell<Option<Bytes>>,
}

#[derive(Debug)]
pub struct ScriptedBuffer {
    data: Bytes,
}

/// Scripted runtime; see the module docs.
#[derive(Debug)]
pub struct ScriptedBackend {
    platforms: Vec<ScriptedPlatform>,
    entry_points: Vec<String>,
    build_log: Option<String>,
    failing_call: Option<&'static str>,
    model: KernelModel,
    calls: RefCell<Vec<&'static str>>,
    last_sources: RefCell<Vec<String>>,
    last_build_options: RefCell<Option<String>>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new(vec![ScriptedPlatform::new("Scripted Platform", &["Scripted Device"])])
    }
}

impl ScriptedBackend {
    pub fn new(platforms: Vec<ScriptedPlatform>) -> Self {
        Self {
            platforms,
            entry_points: vec!["weird".to_string()],
            build_log: None,
            failing_call: None,
            model: default_model,
            calls: RefCell::new(Vec::new()),
            last_sources: RefCell::new(Vec::new()),
            last_build_options: RefCell::new(None),
        }
    }

    /// Make the compiler reject every program with `log`.
    pub fn with_build_failure(mut self, log: &str) -> Self {
        self.build_log = Some(log.to_string());
        self
    }

    /// Make the named runtime call (one of [`call`]) fail.
    pub fn with_failing_call(mut self, name: &'static str) -> Self {
        self.failing_call = Some(name);
        self
    }

    /// Entry points the compiler exports from any program.
    pub fn with_entry_points(mut self, names: &[&str]) -> Self {
        self.entry_points = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn with_model(mut self, model: KernelModel) -> Self {
        self.model = model;
        self
    }

    /// Runtime calls received so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.borrow().clone()
    }

    /// Source texts handed to the most recent program creation.
    pub fn last_sources(&self) -> Vec<String> {
        self.last_sources.borrow().clone()
    }

    /// Options passed to the most recent build.
    pub fn last_build_options(&self) -> Option<String> {
        self.last_build_options.borrow().clone()
    }

    fn enter(&self, name: &'static str) -> Result<()> {
        self.calls.borrow_mut().push(name);
        if self.failing_call == Some(name) {
            return Err(HarnessError::runtime(name, "CL_OUT_OF_RESOURCES"));
        }
        Ok(())
    }

    fn platform(&self, index: usize) -> Result<&ScriptedPlatform> {
        self.platforms
            .get(index)
            .ok_or_else(|| HarnessError::runtime(call::GET_DEVICE_IDS, "CL_INVALID_PLATFORM"))
    }
}

impl ComputeBackend for ScriptedBackend {
    type Platform = usize;
    type Device = ScriptedDevice;
    type Context = ScriptedContext;
    type Queue = ScriptedQueue;
    type Program = ScriptedProgram;
    type Kernel = ScriptedKernel;
    type Buffer = ScriptedBuffer;

    fn name(&self) -> &'static str {
        "scripted"
    }

    fn platforms(&self) -> Result<Vec<usize>> {
        self.enter(call::GET_PLATFORM_IDS)?;
        Ok((0..self.platforms.len()).collect())
    }

    fn devices(&self, platform: &usize) -> Result<Vec<ScriptedDevice>> {
        self.enter(call::GET_DEVICE_IDS)?;
        let count = self.platform(*platform)?.devices.len();
        Ok((0..count)
            .map(|index| ScriptedDevice {
                platform: *platform,
                index,
            })
            .collect())
    }

    fn platform_name(&self, platform: &usize) -> String {
        self.platforms
            .get(*platform)
            .map(|p| p.name.clone())
            .unwrap_or_default()
    }

    fn device_name(&self, device: &ScriptedDevice) -> String {
        self.platforms
            .get(device.platform)
            .and_then(|p| p.devices.get(device.index))
            .cloned()
            .unwrap_or_default()
    }

    fn create_context(&self, device: &ScriptedDevice) -> Result<ScriptedContext> {
        self.enter(call::CREATE_CONTEXT)?;
        Ok(ScriptedContext { device: *device })
    }

    fn create_queue(&self, context: &ScriptedContext, device: &ScriptedDevice) -> Result<ScriptedQueue> {
        self.enter(call::CREATE_COMMAND_QUEUE)?;
        if context.device != *device {
            return Err(HarnessError::runtime(call::CREATE_COMMAND_QUEUE, "CL_INVALID_DEVICE"));
        }
        Ok(ScriptedQueue { device: *device })
    }

    fn create_program(&self, _context: &ScriptedContext, sources: &[KernelSource]) -> Result<ScriptedProgram> {
        self.enter(call::CREATE_PROGRAM)?;
        if sources.is_empty() {
            return Err(HarnessError::runtime(call::CREATE_PROGRAM, "CL_INVALID_VALUE"));
        }
        let texts: Vec<String> = sources.iter().map(|s| s.text().to_string()).collect();
        *self.last_sources.borrow_mut() = texts.clone();
        Ok(ScriptedProgram {
            sources: texts,
            built: false,
        })
    }

    fn build_program(
        &self,
        program: &mut ScriptedProgram,
        _device: &ScriptedDevice,
        options: Option<&str>,
    ) -> Result<BuildOutcome> {
        self.enter(call::BUILD_PROGRAM)?;
        *self.last_build_options.borrow_mut() = options.map(str::to_string);

        match &self.build_log {
            Some(log) => {
                self.enter(call::GET_BUILD_INFO)?;
                Ok(BuildOutcome::Failed { log: log.clone() })
            }
            None => {
                program.built = !program.sources.is_empty();
                Ok(BuildOutcome::Built)
            }
        }
    }

    fn create_kernel(&self, program: &ScriptedProgram, name: &str) -> Result<ScriptedKernel> {
        self.enter(call::CREATE_KERNEL)?;
        if !program.built {
            return Err(HarnessError::runtime(call::CREATE_KERNEL, "CL_INVALID_PROGRAM_EXECUTABLE"));
        }
        if !self.entry_points.iter().any(|e| e == name) {
            return Err(HarnessError::runtime(call::CREATE_KERNEL, "CL_INVALID_KERNEL_NAME"));
        }
        Ok(ScriptedKernel {
            name: name.to_string(),
            arg0: RefCell::new(None),
        })
    }

    fn create_output_buffer(&self, _context: &ScriptedContext, len: usize) -> Result<ScriptedBuffer> {
        self.enter(call::CREATE_BUFFER)?;
        if len == 0 {
            return Err(HarnessError::runtime(call::CREATE_BUFFER, "CL_INVALID_BUFFER_SIZE"));
        }
        Ok(ScriptedBuffer {
            data: Rc::new(RefCell::new(vec![0; len])),
        })
    }

    fn set_buffer_arg(&self, kernel: &ScriptedKernel, index: u32, buffer: &ScriptedBuffer) -> Result<()> {
        self.enter(call::SET_KERNEL_ARG)?;
        if index != 0 {
            return Err(HarnessError::runtime(call::SET_KERNEL_ARG, "CL_INVALID_ARG_INDEX"));
        }
        *kernel.arg0.borrow_mut() = Some(Rc::clone(&buffer.data));
        Ok(())
    }

    fn finish(&self, _queue: &ScriptedQueue) -> Result<()> {
        self.enter(call::FINISH)
    }

    fn enqueue_kernel(&self, queue: &ScriptedQueue, kernel: &ScriptedKernel, work: WorkSize) -> Result<()> {
        self.enter(call::ENQUEUE_ND_RANGE)?;
        if work.local == 0 || work.global % work.local != 0 {
            return Err(HarnessError::runtime(call::ENQUEUE_ND_RANGE, "CL_INVALID_WORK_GROUP_SIZE"));
        }
        let arg = kernel.arg0.borrow();
        let data = arg
            .as_ref()
            .ok_or_else(|| HarnessError::runtime(call::ENQUEUE_ND_RANGE, "CL_INVALID_KERNEL_ARGS"))?;

        tracing::trace!(
            "scripted launch of {} on device {}:{}",
            kernel.name,
            queue.device.platform,
            queue.device.index
        );
        let mut data = data.borrow_mut();
        for (gid, byte) in data.iter_mut().enumerate().take(work.global) {
            *byte = (self.model)(gid);
        }
        Ok(())
    }

    fn read_buffer(&self, _queue: &ScriptedQueue, buffer: &ScriptedBuffer, out: &mut [u8]) -> Result<()> {
        self.enter(call::ENQUEUE_READ_BUFFER)?;
        let data = buffer.data.borrow();
        if out.len() > data.len() {
            return Err(HarnessError::runtime(call::ENQUEUE_READ_BUFFER, "CL_INVALID_VALUE"));
        }
        out.copy_from_slice(&data[..out.len()]);
        Ok(())
    }
}
