//! Dispatch orchestrator.
//!
//! Owns the run: host and device buffers, the launch configuration, and the
//! pass loop over configured modules. The whole run happens on one host
//! thread; submission order into the runtime's single queue is the only
//! ordering discipline, and the final device-to-host copy is the only
//! blocking point (unless per-module synchronization is configured).

use std::path::PathBuf;

use tracing::{debug, info};

use crate::contract::{Invocation, LaunchConfig};
use crate::error::{HarnessError, Result};
use crate::registry::ModuleRegistry;
use crate::runtime::AcceleratorRuntime;
use crate::verify;

/// Seed value: `input[i] = SEED_BASE + i`.
const SEED_BASE: f32 = 1.618;

/// When to wait for enqueued device work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// One barrier at the end of the run (the final copy-back). This is the
    /// original behavior and doubles as a stress test of queue ordering.
    #[default]
    EndOfRun,
    /// Synchronize after every module invocation, localizing device faults
    /// to the module that enqueued them.
    PerModule,
}

/// Validated run configuration.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Element count of both buffers.
    pub elements: usize,
    /// Number of outer passes over the module list.
    pub passes: u32,
    /// Launch configuration shared by every invocation.
    pub launch: LaunchConfig,
    /// Ordered module identifiers to dispatch each pass.
    pub modules: Vec<PathBuf>,
    /// Synchronization policy.
    pub sync: SyncMode,
}

impl HarnessConfig {
    /// Start building a configuration.
    #[must_use]
    pub fn builder() -> HarnessConfigBuilder {
        HarnessConfigBuilder::default()
    }
}

/// Builder for [`HarnessConfig`]; `build` validates.
#[derive(Debug, Clone)]
pub struct HarnessConfigBuilder {
    elements: usize,
    passes: u32,
    launch: LaunchConfig,
    modules: Vec<PathBuf>,
    sync: SyncMode,
}

impl Default for HarnessConfigBuilder {
    fn default() -> Self {
        Self {
            elements: 1_000_000,
            passes: 2,
            launch: LaunchConfig::default(),
            modules: Vec::new(),
            sync: SyncMode::default(),
        }
    }
}

impl HarnessConfigBuilder {
    /// Set the buffer element count.
    #[must_use]
    pub fn elements(mut self, elements: usize) -> Self {
        self.elements = elements;
        self
    }

    /// Set the number of passes over the module list.
    #[must_use]
    pub fn passes(mut self, passes: u32) -> Self {
        self.passes = passes;
        self
    }

    /// Set the launch configuration.
    #[must_use]
    pub fn launch(mut self, launch: LaunchConfig) -> Self {
        self.launch = launch;
        self
    }

    /// Append one module identifier.
    #[must_use]
    pub fn module(mut self, path: impl Into<PathBuf>) -> Self {
        self.modules.push(path.into());
        self
    }

    /// Append many module identifiers, preserving order.
    #[must_use]
    pub fn modules<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.modules.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Set the synchronization policy.
    #[must_use]
    pub fn sync(mut self, sync: SyncMode) -> Self {
        self.sync = sync;
        self
    }

    /// Validate and produce the configuration.
    pub fn build(self) -> Result<HarnessConfig> {
        if self.elements == 0 {
            return Err(HarnessError::InvalidConfig(
                "element count must be nonzero".to_string(),
            ));
        }
        if self.passes == 0 {
            return Err(HarnessError::InvalidConfig(
                "pass count must be at least 1".to_string(),
            ));
        }
        if self.launch.grid == 0 || self.launch.block == 0 {
            return Err(HarnessError::InvalidConfig(format!(
                "launch configuration {} has a zero dimension",
                self.launch
            )));
        }
        Ok(HarnessConfig {
            elements: self.elements,
            passes: self.passes,
            launch: self.launch,
            modules: self.modules,
            sync: self.sync,
        })
    }
}

/// Summary of a completed, verified run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Elements verified.
    pub elements: usize,
    /// Passes executed.
    pub passes: u32,
    /// Distinct modules dispatched per pass.
    pub modules: usize,
    /// Total dynamic launches (passes x modules; the reference launch is
    /// not counted).
    pub launches: u64,
}

/// Drives one run end to end against a given accelerator runtime.
pub struct Orchestrator<'r, R: AcceleratorRuntime> {
    runtime: &'r R,
    config: HarnessConfig,
    registry: ModuleRegistry,
}

impl<'r, R: AcceleratorRuntime> Orchestrator<'r, R> {
    /// Bind a validated configuration to a runtime.
    pub fn new(runtime: &'r R, config: HarnessConfig) -> Self {
        Self {
            runtime,
            config,
            registry: ModuleRegistry::new(),
        }
    }

    /// Execute the run: setup, warm-up, pass loop, copy-back, verify.
    ///
    /// Every failure is fatal and returned immediately; no device call is
    /// attempted after a load or resolve error, and nothing is retried.
    pub fn run(&self) -> Result<RunReport> {
        let cfg = &self.config;
        let n = cfg.elements;
        let device = self.runtime.info();
        info!(device = %device.name, ordinal = device.ordinal, "running on device");
        info!(
            elements = n,
            passes = cfg.passes,
            modules = cfg.modules.len(),
            launch = %cfg.launch,
            "run configuration"
        );

        // Host staging buffers. The input values are a fixed arithmetic
        // sequence so verification is exact, not statistical.
        let host_input: Vec<f32> = (0..n).map(|i| SEED_BASE + i as f32).collect();
        let mut host_output = vec![0.0f32; n];

        let device_input = self.runtime.alloc(n)?;
        let device_output = self.runtime.alloc(n)?;
        self.runtime.copy_to_device(&device_input, &host_input)?;
        debug!(bytes = 2 * n * std::mem::size_of::<f32>(), "device buffers ready");

        // Warm-up with the statically linked reference kernel: proves the
        // device pipeline works before any dynamic loading is exercised.
        info!("launching reference kernel");
        self.runtime
            .launch_reference(&cfg.launch, &device_output, &device_input)?;

        let inv = Invocation {
            output: device_output.as_mut_ptr(),
            input: device_input.as_ptr(),
            count: n,
        };

        let mut launches = 0u64;
        for pass in 1..=cfg.passes {
            debug!(pass, "starting pass");
            for path in &cfg.modules {
                let handle = self.registry.obtain(path)?;
                info!(pass, module = %handle.id(), "launching module kernel");
                handle.invoke(&cfg.launch, &inv);
                launches += 1;
                if cfg.sync == SyncMode::PerModule {
                    self.runtime.synchronize()?;
                }
            }
        }

        // The blocking copy-back is the run's synchronization barrier: every
        // launch enqueued above has completed once it returns.
        info!("copying result back to host");
        self.runtime.copy_to_host(&device_output, &mut host_output)?;

        verify::verify(&host_input, &host_output)?;

        Ok(RunReport {
            elements: n,
            passes: cfg.passes,
            modules: cfg.modules.len(),
            launches,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::host::HostRuntime;

    #[test]
    fn builder_defaults_match_the_original_run() {
        let cfg = HarnessConfig::builder().build().unwrap();
        assert_eq!(cfg.elements, 1_000_000);
        assert_eq!(cfg.passes, 2);
        assert_eq!(cfg.launch, LaunchConfig::new(512, 256));
        assert_eq!(cfg.sync, SyncMode::EndOfRun);
        assert!(cfg.modules.is_empty());
    }

    #[test]
    fn builder_rejects_zero_elements() {
        let err = HarnessConfig::builder().elements(0).build().unwrap_err();
        assert!(matches!(err, HarnessError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_zero_passes() {
        assert!(HarnessConfig::builder().passes(0).build().is_err());
    }

    #[test]
    fn builder_rejects_zero_launch_dimension() {
        let err = HarnessConfig::builder()
            .launch(LaunchConfig::new(512, 0))
            .build()
            .unwrap_err();
        assert!(matches!(err, HarnessError::InvalidConfig(_)));
    }

    #[test]
    fn reference_only_run_passes() {
        let runtime = HostRuntime::new();
        let config = HarnessConfig::builder().elements(10_000).build().unwrap();
        let report = Orchestrator::new(&runtime, config).run().unwrap();
        assert_eq!(report.elements, 10_000);
        assert_eq!(report.launches, 0);
    }

    #[test]
    fn missing_module_fails_before_any_launch_is_counted() {
        let runtime = HostRuntime::new();
        let config = HarnessConfig::builder()
            .elements(1_000)
            .module("/nonexistent/libfoo1.so")
            .build()
            .unwrap();
        let err = Orchestrator::new(&runtime, config).run().unwrap_err();
        assert!(matches!(err, HarnessError::LoadFailure { .. }));
    }
}
