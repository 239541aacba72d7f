//! Accelerator runtime abstraction.
//!
//! The device side of the harness is an external collaborator: buffer
//! allocation, host-device transfers, and synchronization are reached only
//! through [`AcceleratorRuntime`]. The chosen runtime value is constructed
//! once and passed explicitly through every component; there is no ambient
//! global device state, so multiple runtimes can coexist within one process
//! (which is what lets the test suite run several harnesses side by side).
//!
//! Backends:
//! - [`host::HostRuntime`] - always available, executes launches inline on
//!   the host; the reference backend for tests and machines without a device.
//! - [`cuda::CudaRuntime`] - real device execution via cudarc (`cuda` feature).

pub mod host;

#[cfg(feature = "cuda")]
pub mod cuda;

use crate::contract::LaunchConfig;
use crate::error::Result;

/// Opaque handle to a contiguous f32 buffer in accelerator memory.
///
/// The backing storage is owned by the runtime that allocated it and is
/// released when that runtime is dropped; the handle itself is plain data.
#[derive(Debug, Clone, Copy)]
pub struct DeviceBuffer {
    /// Device address of the first element.
    ptr: usize,
    /// Element count.
    len: usize,
}

impl DeviceBuffer {
    /// Build a handle from a raw device address and element count.
    ///
    /// Only runtime implementations construct these.
    #[must_use]
    pub fn from_raw(ptr: usize, len: usize) -> Self {
        Self { ptr, len }
    }

    /// Device pointer as a const f32 pointer for FFI.
    #[must_use]
    pub fn as_ptr(&self) -> *const f32 {
        self.ptr as *const f32
    }

    /// Device pointer as a mutable f32 pointer for FFI.
    #[must_use]
    pub fn as_mut_ptr(&self) -> *mut f32 {
        self.ptr as *mut f32
    }

    /// Element count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer holds zero elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Device description for run banners and diagnostics.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Device ordinal.
    pub ordinal: usize,
    /// Human-readable device name.
    pub name: String,
}

/// The accelerator runtime collaborator.
///
/// All device work submitted through one runtime executes in submission
/// order; [`AcceleratorRuntime::copy_to_host`] is a full synchronization
/// barrier that drains everything enqueued before it.
pub trait AcceleratorRuntime {
    /// Describe the device this runtime drives.
    fn info(&self) -> DeviceInfo;

    /// Allocate a device buffer of `len` f32 elements.
    fn alloc(&self, len: usize) -> Result<DeviceBuffer>;

    /// Copy `src` into `dst` on the device. `src.len()` must equal `dst.len()`.
    fn copy_to_device(&self, dst: &DeviceBuffer, src: &[f32]) -> Result<()>;

    /// Blocking copy of `src` back to host memory. This is the run's
    /// synchronization point: all previously enqueued launches complete
    /// before it returns. `dst.len()` must equal `src.len()`.
    fn copy_to_host(&self, src: &DeviceBuffer, dst: &mut [f32]) -> Result<()>;

    /// Wait for all enqueued device work to complete.
    fn synchronize(&self) -> Result<()>;

    /// Launch the statically linked reference implementation of the
    /// contract: `output[i] = input[i] * input[i]` over `output.len()`
    /// elements, strided by `launch.stride()`.
    fn launch_reference(
        &self,
        launch: &LaunchConfig,
        output: &DeviceBuffer,
        input: &DeviceBuffer,
    ) -> Result<()>;
}
