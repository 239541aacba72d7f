//! # modsquare
//!
//! A correctness harness for dynamic kernel dispatch: many independently
//! compiled, dynamically loadable compute modules all export one fixed C-ABI
//! entry point that squares a float array on an accelerator device. The
//! harness loads each configured module at run time, invokes the shared entry
//! point against the same device buffers for a configured number of passes,
//! and verifies the final output against the exact host-computed expectation.
//!
//! ## Core pieces
//!
//! - [`contract`] - the entry-point ABI every loadable module must satisfy
//! - [`ModuleRegistry`] - load-by-name, version-check, resolve-by-name dispatch
//! - [`AcceleratorRuntime`] - the device collaborator seam (host backend always
//!   available, CUDA behind the `cuda` feature)
//! - [`Orchestrator`] - buffer ownership and the multi-pass dispatch loop
//! - [`verify`] - bit-exact result verification
//!
//! ## Example
//!
//! ```no_run
//! use modsquare::{HarnessConfig, HostRuntime, Orchestrator};
//!
//! let config = HarnessConfig::builder()
//!     .elements(1_000_000)
//!     .passes(2)
//!     .module("libfoo1.so")
//!     .module("libfoo2.so")
//!     .build()?;
//!
//! let runtime = HostRuntime::new();
//! let report = Orchestrator::new(&runtime, config).run()?;
//! println!("verified {} elements", report.elements);
//! # Ok::<(), modsquare::HarnessError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod contract;
pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod runtime;
pub mod verify;

pub use contract::{Invocation, LaunchConfig, ABI_VERSION};
pub use error::{HarnessError, Result};
pub use orchestrator::{HarnessConfig, HarnessConfigBuilder, Orchestrator, RunReport, SyncMode};
pub use registry::{ModuleHandle, ModuleRegistry};
pub use runtime::host::HostRuntime;
pub use runtime::{AcceleratorRuntime, DeviceBuffer, DeviceInfo};

#[cfg(feature = "cuda")]
pub use runtime::cuda::CudaRuntime;
