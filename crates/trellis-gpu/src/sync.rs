//! Synchronization primitives.

use std::sync::Arc;

use crate::backend::DeviceBackend;
use crate::device::Device;
use crate::error::Result;
use ash::vk;

/// Create a semaphore.
///
/// Caller owns the handle and destroys it through the same device.
pub fn create_semaphore<D: DeviceBackend>(device: &D) -> Result<vk::Semaphore> {
    device.create_semaphore()
}

/// A binary CPU-visible completion signal.
///
/// Holds the device it was created on and destroys the fence on drop.
pub struct Fence<D: DeviceBackend = Device> {
    device: Arc<D>,
    fence: vk::Fence,
}

impl<D: DeviceBackend> Fence<D> {
    /// Create a fence, optionally already signaled.
    pub fn new(device: Arc<D>, signaled: bool) -> Result<Self> {
        let fence = device.create_fence(signaled)?;
        Ok(Self { device, fence })
    }

    /// The raw fence handle.
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Reset to unsignaled. The fence must not be in use by pending work.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn reset(&self) -> Result<()> {
        unsafe { self.device.reset_fence(self.fence) }
    }

    /// Block until the fence is signaled or the timeout expires.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn wait(&self, timeout_ns: u64) -> Result<()> {
        unsafe { self.device.wait_for_fence(self.fence, timeout_ns) }
    }

    /// Block until the fence is signaled.
    pub fn wait_forever(&self) -> Result<()> {
        self.wait(u64::MAX)
    }

    /// Destroy the fence. Calling this more than once is harmless.
    pub fn destroy(&mut self) {
        if self.fence != vk::Fence::null() {
            unsafe { self.device.destroy_fence(self.fence) };
            self.fence = vk::Fence::null();
        }
    }
}

impl<D: DeviceBackend> Drop for Fence<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{FenceState, Kind, MockBackend};

    #[test]
    fn signaled_fence_does_not_block() {
        let device = Arc::new(MockBackend::new());
        let fence = Fence::new(device.clone(), true).unwrap();

        fence.wait_forever().unwrap();
        fence.reset().unwrap();
        assert_eq!(
            device.state().fence_state(fence.handle()),
            Some(FenceState::Unsignaled)
        );
        // Nothing was submitted, so waiting now would hang.
        assert!(fence.wait(1_000).is_err());
    }

    #[test]
    fn destroy_is_idempotent() {
        let device = Arc::new(MockBackend::new());
        let mut fence = Fence::new(device.clone(), false).unwrap();
        assert_eq!(device.state().live(Kind::Fence), 1);

        fence.destroy();
        fence.destroy();
        assert_eq!(fence.handle(), vk::Fence::null());
        drop(fence);
        assert_eq!(device.state().live(Kind::Fence), 0);
    }

    #[test]
    fn semaphore_helper_goes_through_backend() {
        let device = MockBackend::new();
        let semaphore = create_semaphore(&device).unwrap();
        assert_ne!(semaphore, vk::Semaphore::null());
        unsafe { device.destroy_semaphore(semaphore) };
        assert_eq!(device.state().total_live(), 0);
    }
}
