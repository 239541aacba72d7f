//! CUDA accelerator runtime (requires the `cuda` feature).
//!
//! Drives a real device through cudarc. The statically linked reference
//! kernel is CUDA C compiled to PTX with NVRTC at runtime creation, so no
//! toolkit is needed at build time. Dynamically loaded modules receive raw
//! device addresses and are expected to enqueue their own launches against
//! the same device context.

use std::collections::HashMap;
use std::sync::Arc;

use cudarc::driver::{CudaDevice as CudarcDevice, CudaFunction, CudaSlice, DevicePtr, LaunchAsync};
use cudarc::nvrtc::compile_ptx;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::contract::LaunchConfig;
use crate::error::{HarnessError, Result};
use crate::runtime::{AcceleratorRuntime, DeviceBuffer, DeviceInfo};

/// Reference implementation of the contract, in CUDA C. Same grid-stride
/// shape the loadable modules use.
const REFERENCE_KERNEL_CUDA: &str = r#"
extern "C" __global__ void vector_square_ref(float* out, const float* in, size_t n) {
    size_t offset = blockIdx.x * blockDim.x + threadIdx.x;
    size_t stride = (size_t)blockDim.x * gridDim.x;
    for (size_t i = offset; i < n; i += stride) {
        out[i] = in[i] * in[i];
    }
}
"#;

/// cudarc-backed implementation of [`AcceleratorRuntime`].
pub struct CudaRuntime {
    device: Arc<CudarcDevice>,
    ordinal: usize,
    name: String,
    reference: CudaFunction,
    /// Backing slices for issued handles, keyed by device address.
    allocations: Mutex<HashMap<usize, CudaSlice<f32>>>,
}

impl CudaRuntime {
    /// Bind to device `ordinal` and compile the reference kernel.
    pub fn new(ordinal: usize) -> Result<Self> {
        let device = CudarcDevice::new(ordinal).map_err(|e| HarnessError::device("set_device", e))?;
        let name = device
            .name()
            .map_err(|e| HarnessError::device("get_device_properties", e))?;
        info!(ordinal, name = %name, "CUDA device selected");

        let ptx =
            compile_ptx(REFERENCE_KERNEL_CUDA).map_err(|e| HarnessError::device("nvrtc", e))?;
        device
            .load_ptx(ptx, "modsquare_ref", &["vector_square_ref"])
            .map_err(|e| HarnessError::device("load_ptx", e))?;
        let reference = device
            .get_func("modsquare_ref", "vector_square_ref")
            .ok_or(HarnessError::Device {
                call: "get_func",
                reason: "reference kernel not found after PTX load".to_string(),
            })?;

        Ok(Self {
            device,
            ordinal,
            name,
            reference,
            allocations: Mutex::new(HashMap::new()),
        })
    }

    /// Number of visible CUDA devices, 0 when the driver is absent.
    pub fn device_count() -> usize {
        CudarcDevice::count().unwrap_or(0) as usize
    }
}

impl AcceleratorRuntime for CudaRuntime {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            ordinal: self.ordinal,
            name: self.name.clone(),
        }
    }

    fn alloc(&self, len: usize) -> Result<DeviceBuffer> {
        if len == 0 {
            return Err(HarnessError::InvalidConfig(
                "cannot allocate a zero-length buffer".to_string(),
            ));
        }
        let slice = self
            .device
            .alloc_zeros::<f32>(len)
            .map_err(|e| HarnessError::device("alloc", e))?;
        let ptr = *slice.device_ptr() as usize;
        debug!(len, ptr, "allocated device buffer");
        self.allocations.lock().insert(ptr, slice);
        Ok(DeviceBuffer::from_raw(ptr, len))
    }

    fn copy_to_device(&self, dst: &DeviceBuffer, src: &[f32]) -> Result<()> {
        let mut allocations = self.allocations.lock();
        let slice = allocations
            .get_mut(&(dst.as_ptr() as usize))
            .ok_or(HarnessError::Device {
                call: "copy_to_device",
                reason: "buffer handle not issued by this runtime".to_string(),
            })?;
        self.device
            .htod_sync_copy_into(src, slice)
            .map_err(|e| HarnessError::device("copy_to_device", e))
    }

    fn copy_to_host(&self, src: &DeviceBuffer, dst: &mut [f32]) -> Result<()> {
        let allocations = self.allocations.lock();
        let slice = allocations
            .get(&(src.as_ptr() as usize))
            .ok_or(HarnessError::Device {
                call: "copy_to_host",
                reason: "buffer handle not issued by this runtime".to_string(),
            })?;
        let host = self
            .device
            .dtoh_sync_copy(slice)
            .map_err(|e| HarnessError::device("copy_to_host", e))?;
        dst.copy_from_slice(&host);
        Ok(())
    }

    fn synchronize(&self) -> Result<()> {
        self.device
            .synchronize()
            .map_err(|e| HarnessError::device("synchronize", e))
    }

    fn launch_reference(
        &self,
        launch: &LaunchConfig,
        output: &DeviceBuffer,
        input: &DeviceBuffer,
    ) -> Result<()> {
        let config = cudarc::driver::LaunchConfig {
            grid_dim: (launch.grid, 1, 1),
            block_dim: (launch.block, 1, 1),
            shared_mem_bytes: 0,
        };
        debug!(config = %launch, n = output.len(), "launching reference kernel");
        // SAFETY: both handles were issued by this runtime with at least
        // output.len() elements; the kernel strides without reading past n.
        unsafe {
            self.reference
                .clone()
                .launch(
                    config,
                    (
                        output.as_mut_ptr() as u64,
                        input.as_ptr() as u64,
                        output.len(),
                    ),
                )
                .map_err(|e| HarnessError::device("launch", e))
        }
    }
}
