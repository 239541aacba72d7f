//! Error types for the dispatch harness.
//!
//! Every variant is fatal: the harness is a correctness tool, so any anomaly
//! invalidates the whole run and is propagated up to the caller unrecovered.

use thiserror::Error;

/// Harness result type alias.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Harness error taxonomy.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// A loadable module binary could not be found or opened.
    #[error("failed to load module '{module}': {reason}")]
    LoadFailure {
        /// Module identifier (path or library name).
        module: String,
        /// Loader-reported reason.
        reason: String,
    },

    /// A contracted symbol is missing from an opened module.
    #[error("symbol '{symbol}' not found in module '{module}'")]
    SymbolNotFound {
        /// Module identifier.
        module: String,
        /// The symbol that failed to resolve.
        symbol: String,
    },

    /// A module exports an ABI version the harness does not speak.
    #[error("module '{module}' reports ABI version {found}, expected {expected}")]
    AbiMismatch {
        /// Module identifier.
        module: String,
        /// Version word read from the module.
        found: u32,
        /// Version the harness was built against.
        expected: u32,
    },

    /// An accelerator runtime call failed.
    #[error("device call '{call}' failed: {reason}")]
    Device {
        /// The failing runtime operation.
        call: &'static str,
        /// Runtime-reported reason.
        reason: String,
    },

    /// Device output disagrees with the host-computed expectation.
    #[error("verification mismatch at index {index}: expected {expected}, got {actual}")]
    VerificationMismatch {
        /// First failing element index.
        index: usize,
        /// Host-computed expected value.
        expected: f32,
        /// Value copied back from the device.
        actual: f32,
    },

    /// Run configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl HarnessError {
    /// Build a [`HarnessError::Device`] from a runtime error's display form.
    pub fn device(call: &'static str, err: impl std::fmt::Display) -> Self {
        HarnessError::Device {
            call,
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_failing_module() {
        let err = HarnessError::SymbolNotFound {
            module: "libfoo7.so".to_string(),
            symbol: "vector_square".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("libfoo7.so"));
        assert!(msg.contains("vector_square"));
    }

    #[test]
    fn mismatch_message_carries_index_and_values() {
        let err = HarnessError::VerificationMismatch {
            index: 42,
            expected: 4.0,
            actual: 3.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("index 42"));
        assert!(msg.contains("expected 4"));
    }
}
