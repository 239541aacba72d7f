//! Host (CPU) accelerator runtime.
//!
//! Simulates the device for testing and for machines without an accelerator.
//! "Device memory" is raw, stably addressed host memory, so the pointers the
//! orchestrator hands to dynamically loaded modules are directly dereferencable
//! by host code inside those modules. Launches execute inline on the calling
//! thread, which preserves submission order trivially and makes every copy a
//! natural synchronization point.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

use parking_lot::Mutex;
use tracing::debug;

use crate::contract::LaunchConfig;
use crate::error::{HarnessError, Result};
use crate::runtime::{AcceleratorRuntime, DeviceBuffer, DeviceInfo};

/// One raw allocation standing in for a device buffer.
struct HostAllocation {
    ptr: NonNull<f32>,
    layout: Layout,
}

impl Drop for HostAllocation {
    fn drop(&mut self) {
        // SAFETY: ptr/layout come from the alloc_zeroed call in `alloc`.
        unsafe { dealloc(self.ptr.as_ptr().cast(), self.layout) }
    }
}

// SAFETY: the allocation is plain memory; the runtime serializes access.
unsafe impl Send for HostAllocation {}
unsafe impl Sync for HostAllocation {}

/// CPU-backed implementation of [`AcceleratorRuntime`].
pub struct HostRuntime {
    /// Backing storage for every handle this runtime has issued. Released
    /// when the runtime drops, which the orchestrator never outlives.
    allocations: Mutex<Vec<HostAllocation>>,
}

impl HostRuntime {
    /// Create a host runtime.
    #[must_use]
    pub fn new() -> Self {
        Self {
            allocations: Mutex::new(Vec::new()),
        }
    }
}

impl Default for HostRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl AcceleratorRuntime for HostRuntime {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            ordinal: 0,
            name: "host (inline execution)".to_string(),
        }
    }

    fn alloc(&self, len: usize) -> Result<DeviceBuffer> {
        if len == 0 {
            return Err(HarnessError::InvalidConfig(
                "cannot allocate a zero-length buffer".to_string(),
            ));
        }
        let layout = Layout::array::<f32>(len).map_err(|e| HarnessError::device("alloc", e))?;
        // SAFETY: layout is non-zero-sized.
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw.cast::<f32>()).ok_or(HarnessError::Device {
            call: "alloc",
            reason: format!("host allocation of {} bytes failed", layout.size()),
        })?;

        debug!(len, bytes = layout.size(), "allocated host-backed buffer");

        let handle = DeviceBuffer::from_raw(ptr.as_ptr() as usize, len);
        self.allocations.lock().push(HostAllocation { ptr, layout });
        Ok(handle)
    }

    fn copy_to_device(&self, dst: &DeviceBuffer, src: &[f32]) -> Result<()> {
        if src.len() != dst.len() {
            return Err(HarnessError::Device {
                call: "copy_to_device",
                reason: format!("length mismatch: {} vs {}", src.len(), dst.len()),
            });
        }
        // SAFETY: dst was issued by this runtime with capacity dst.len().
        unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), dst.as_mut_ptr(), src.len()) }
        Ok(())
    }

    fn copy_to_host(&self, src: &DeviceBuffer, dst: &mut [f32]) -> Result<()> {
        if dst.len() != src.len() {
            return Err(HarnessError::Device {
                call: "copy_to_host",
                reason: format!("length mismatch: {} vs {}", dst.len(), src.len()),
            });
        }
        // Inline execution means everything enqueued has already run; the
        // copy is trivially a barrier.
        // SAFETY: src was issued by this runtime with capacity src.len().
        unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), dst.as_mut_ptr(), dst.len()) }
        Ok(())
    }

    fn synchronize(&self) -> Result<()> {
        Ok(())
    }

    fn launch_reference(
        &self,
        launch: &LaunchConfig,
        output: &DeviceBuffer,
        input: &DeviceBuffer,
    ) -> Result<()> {
        let n = output.len();
        let stride = launch.stride();
        if stride == 0 {
            return Err(HarnessError::InvalidConfig(
                "launch configuration has zero execution units".to_string(),
            ));
        }
        debug!(config = %launch, n, "launching reference kernel inline");

        let out = output.as_mut_ptr();
        let inp = input.as_ptr();
        // Same grid-stride shape a device kernel uses: each execution unit
        // starts at its offset and steps by grid*block until past n.
        for offset in 0..stride.min(n) {
            let mut i = offset;
            while i < n {
                // SAFETY: both buffers were issued by this runtime with at
                // least n elements, and i < n.
                unsafe { *out.add(i) = *inp.add(i) * *inp.add(i) };
                i += stride;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_round_trip() {
        let rt = HostRuntime::new();
        let buf = rt.alloc(1024).unwrap();

        let data: Vec<f32> = (0..1024).map(|i| i as f32).collect();
        rt.copy_to_device(&buf, &data).unwrap();

        let mut back = vec![0.0f32; 1024];
        rt.copy_to_host(&buf, &mut back).unwrap();
        assert_eq!(data, back);
    }

    #[test]
    fn fresh_buffers_are_zeroed() {
        let rt = HostRuntime::new();
        let buf = rt.alloc(16).unwrap();
        let mut back = vec![1.0f32; 16];
        rt.copy_to_host(&buf, &mut back).unwrap();
        assert!(back.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn zero_length_alloc_is_rejected() {
        let rt = HostRuntime::new();
        assert!(rt.alloc(0).is_err());
    }

    #[test]
    fn length_mismatch_is_a_device_error() {
        let rt = HostRuntime::new();
        let buf = rt.alloc(8).unwrap();
        let err = rt.copy_to_device(&buf, &[0.0; 4]).unwrap_err();
        assert!(matches!(err, HarnessError::Device { .. }));
    }

    #[test]
    fn reference_kernel_squares_every_element() {
        let rt = HostRuntime::new();
        let n = 1000;
        let input = rt.alloc(n).unwrap();
        let output = rt.alloc(n).unwrap();

        let host: Vec<f32> = (0..n).map(|i| 1.618f32 + i as f32).collect();
        rt.copy_to_device(&input, &host).unwrap();

        rt.launch_reference(&LaunchConfig::default(), &output, &input)
            .unwrap();

        let mut back = vec![0.0f32; n];
        rt.copy_to_host(&output, &mut back).unwrap();
        for (i, (&got, &a)) in back.iter().zip(host.iter()).enumerate() {
            assert_eq!(got, a * a, "element {i}");
        }
    }

    #[test]
    fn reference_kernel_covers_n_not_divisible_by_stride() {
        let rt = HostRuntime::new();
        // stride = 6, n = 17: every unit wraps a different number of times.
        let n = 17;
        let input = rt.alloc(n).unwrap();
        let output = rt.alloc(n).unwrap();

        let host: Vec<f32> = (0..n).map(|i| i as f32).collect();
        rt.copy_to_device(&input, &host).unwrap();

        rt.launch_reference(&LaunchConfig::new(2, 3), &output, &input)
            .unwrap();

        let mut back = vec![-1.0f32; n];
        rt.copy_to_host(&output, &mut back).unwrap();
        for i in 0..n {
            assert_eq!(back[i], (i as f32) * (i as f32), "element {i}");
        }
    }

    #[test]
    fn zero_stride_launch_is_rejected() {
        let rt = HostRuntime::new();
        let input = rt.alloc(4).unwrap();
        let output = rt.alloc(4).unwrap();
        let err = rt
            .launch_reference(&LaunchConfig::new(0, 256), &output, &input)
            .unwrap_err();
        assert!(matches!(err, HarnessError::InvalidConfig(_)));
    }
}
