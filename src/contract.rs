//! The compute module contract.
//!
//! Every loadable module exports exactly two unmangled symbols:
//!
//! - [`ENTRY_SYMBOL`] (`vector_square`): the launch wrapper. It enqueues a
//!   kernel that writes `input[i] * input[i]` into `output[i]` for every
//!   `i < count` and returns without blocking; results become visible at the
//!   accelerator runtime's next synchronization point.
//! - [`ABI_VERSION_SYMBOL`] (`vector_square_abi_version`): a `u32` version
//!   word. The registry checks it against [`ABI_VERSION`] before the entry
//!   point is trusted, so an argument-order or convention change in a rebuilt
//!   module fails loudly instead of corrupting memory.
//!
//! Grid-stride requirement: `grid * block` need not divide `count`; a module
//! kernel must stride over the full range regardless.

use std::fmt;

/// ABI version the harness speaks. Version 1 fixes the argument order
/// `(grid, block, output, input, count)` and the C calling convention.
pub const ABI_VERSION: u32 = 1;

/// Unmangled name of the contracted entry point.
pub const ENTRY_SYMBOL: &[u8] = b"vector_square\0";

/// Unmangled name of the exported ABI version word.
pub const ABI_VERSION_SYMBOL: &[u8] = b"vector_square_abi_version\0";

/// Type of the contracted entry point.
///
/// # Safety
///
/// Callers must pass device pointers valid for at least `count` elements,
/// with `output` writable and `input` readable, and must keep both buffers
/// alive until the next runtime synchronization point.
pub type EntryFn =
    unsafe extern "C" fn(grid: u32, block: u32, output: *mut f32, input: *const f32, count: usize);

/// Parallel decomposition of a kernel launch.
///
/// Passed unchanged to every module invocation within a run; the identical
/// configuration is what makes cross-module output comparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Number of blocks in the grid.
    pub grid: u32,
    /// Number of threads per block.
    pub block: u32,
}

impl LaunchConfig {
    /// Create a launch configuration.
    #[must_use]
    pub fn new(grid: u32, block: u32) -> Self {
        Self { grid, block }
    }

    /// Total execution units per stride, `grid * block`.
    #[must_use]
    pub fn stride(&self) -> usize {
        self.grid as usize * self.block as usize
    }
}

impl Default for LaunchConfig {
    /// The original harness constants: 512 blocks of 256 threads.
    fn default() -> Self {
        Self {
            grid: 512,
            block: 256,
        }
    }
}

impl fmt::Display for LaunchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.grid, self.block)
    }
}

/// The argument tuple shared by every invocation of a run.
///
/// One value is built by the orchestrator after buffer setup and reused for
/// the reference kernel and for every module across every pass.
#[derive(Debug, Clone, Copy)]
pub struct Invocation {
    /// Device pointer to the output buffer (write-only to modules).
    pub output: *mut f32,
    /// Device pointer to the input buffer (read-only to modules).
    pub input: *const f32,
    /// Element count of both buffers.
    pub count: usize,
}

// SAFETY: the pointers address device-resident buffers that only the single
// host thread hands out; the harness never shares an Invocation across threads
// mid-run.
unsafe impl Send for Invocation {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_launch_config_matches_original_constants() {
        let cfg = LaunchConfig::default();
        assert_eq!(cfg.grid, 512);
        assert_eq!(cfg.block, 256);
        assert_eq!(cfg.stride(), 512 * 256);
    }

    #[test]
    fn symbol_names_are_nul_terminated() {
        assert_eq!(ENTRY_SYMBOL.last(), Some(&0));
        assert_eq!(ABI_VERSION_SYMBOL.last(), Some(&0));
    }
}
