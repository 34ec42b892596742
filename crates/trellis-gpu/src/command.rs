//! One-off command buffers for setup-time transfers.

use crate::backend::DeviceBackend;
use crate::device::Device;
use crate::error::{GpuError, Result};
use ash::vk;

/// A one-time-submit command buffer that blocks until the queue is idle.
///
/// Meant for uploads and layout transitions, not for per-frame work.
pub struct SingleShotCommand<'a, D: DeviceBackend = Device> {
    device: &'a D,
    cmd: vk::CommandBuffer,
}

impl<'a, D: DeviceBackend> SingleShotCommand<'a, D> {
    /// Allocate a command buffer and begin recording.
    pub fn start(device: &'a D) -> Result<Self> {
        let cmd = device
            .allocate_command_buffers(1)?
            .into_iter()
            .next()
            .ok_or_else(|| GpuError::InvalidState("No command buffer allocated".to_string()))?;

        // Constructed first so an error from begin still frees the buffer.
        let command = Self { device, cmd };
        unsafe {
            device.begin_command_buffer(cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        }
        Ok(command)
    }

    /// The command buffer being recorded.
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.cmd
    }

    /// End recording, submit and wait for the queue to go idle.
    ///
    /// The command buffer is freed afterwards, also on error.
    pub fn end(self) -> Result<()> {
        let cmds = [self.cmd];
        let submit_info = vk::SubmitInfo::default().command_buffers(&cmds);
        unsafe {
            self.device.end_command_buffer(self.cmd)?;
            self.device.queue_submit(&[submit_info], vk::Fence::null())?;
        }
        self.device.queue_wait_idle()
    }
}

impl<D: DeviceBackend> Drop for SingleShotCommand<'_, D> {
    fn drop(&mut self) {
        unsafe { self.device.free_command_buffers(&[self.cmd]) };
    }
}

/// Record `f` into a single-shot command buffer and run it to completion.
pub fn execute<D, F>(device: &D, f: F) -> Result<()>
where
    D: DeviceBackend,
    F: FnOnce(vk::CommandBuffer),
{
    let command = SingleShotCommand::start(device)?;
    f(command.command_buffer());
    command.end()
}
