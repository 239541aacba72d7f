//! Result verification.
//!
//! The seed values and the squaring are exactly representable for the range
//! the harness uses, so comparison is exact equality with no tolerance. Any
//! epsilon would mask a module that computes something other than the single
//! f32 multiply the contract specifies.

use tracing::info;

use crate::error::{HarnessError, Result};

/// Check `output[i] == input[i] * input[i]` for every index.
///
/// Stops at the first mismatch and reports its index together with the
/// expected and actual values; there is no value in enumerating the rest
/// once the run is known bad.
pub fn verify(input: &[f32], output: &[f32]) -> Result<()> {
    debug_assert_eq!(input.len(), output.len());
    for (i, (&a, &c)) in input.iter().zip(output.iter()).enumerate() {
        let expected = a * a;
        if c != expected {
            return Err(HarnessError::VerificationMismatch {
                index: i,
                expected,
                actual: c,
            });
        }
    }
    info!(elements = input.len(), "verification passed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_exact_squares() {
        let input: Vec<f32> = (0..1000).map(|i| 1.618f32 + i as f32).collect();
        let output: Vec<f32> = input.iter().map(|&a| a * a).collect();
        assert!(verify(&input, &output).is_ok());
    }

    #[test]
    fn reports_first_mismatch_only() {
        let input = vec![2.0f32, 3.0, 4.0];
        let mut output = vec![4.0f32, 9.0, 16.0];
        output[1] = 8.0;
        output[2] = 0.0;

        match verify(&input, &output).unwrap_err() {
            HarnessError::VerificationMismatch {
                index,
                expected,
                actual,
            } => {
                assert_eq!(index, 1);
                assert_eq!(expected, 9.0);
                assert_eq!(actual, 8.0);
            }
            other => panic!("expected VerificationMismatch, got {other:?}"),
        }
    }

    #[test]
    fn rejects_off_by_epsilon() {
        let input = vec![2.0f32];
        let output = vec![4.0f32 + f32::EPSILON * 4.0];
        assert!(verify(&input, &output).is_err());
    }

    #[test]
    fn empty_buffers_trivially_pass() {
        assert!(verify(&[], &[]).is_ok());
    }
}
