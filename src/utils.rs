//! Utility functions for motion-eval-rs.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::OnceLock;

/// Global set of warned messages (for warn_once).
static WARNED_MESSAGES: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();

/// Emit a warning through `tracing` only once per distinct message.
///
/// Subsequent calls with the same message are ignored.
pub fn warn_once(message: &str) {
    let warned = WARNED_MESSAGES.get_or_init(|| Mutex::new(HashSet::new()));
    if let Ok(mut guard) = warned.lock() {
        if guard.insert(message.to_string()) {
            tracing::warn!("{}", message);
        }
    }
}

/// Softmax over a slice of logits.
///
/// The maximum is subtracted before exponentiation, so large logits do not
/// overflow. An empty slice yields an empty vector.
pub fn softmax(logits: &[f64]) -> Vec<f64> {
    if logits.is_empty() {
        return Vec::new();
    }

    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Check that every value is finite.
pub fn all_finite<'a>(values: impl IntoIterator<Item = &'a f64>) -> bool {
    values.into_iter().all(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_softmax_reference_values() {
        let p = softmax(&[1.0, 2.0, 3.0]);
        assert_relative_eq!(p[0], 0.0900, epsilon = 1e-4);
        assert_relative_eq!(p[1], 0.2447, epsilon = 1e-4);
        assert_relative_eq!(p[2], 0.6652, epsilon = 1e-4);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_softmax_is_shift_invariant() {
        let a = softmax(&[1.0, 2.0, 3.0]);
        let b = softmax(&[1001.0, 1002.0, 1003.0]);
        for (x, y) in a.iter().zip(&b) {
            assert_relative_eq!(x, y, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_softmax_large_logits_do_not_overflow() {
        let p = softmax(&[1e308, 0.0]);
        assert_relative_eq!(p[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(p[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_softmax_uniform_and_empty() {
        let p = softmax(&[0.5; 4]);
        assert!(p.iter().all(|&x| x == 0.25));
        assert!(softmax(&[]).is_empty());
    }

    #[test]
    fn test_all_finite() {
        assert!(all_finite(&[1.0, -2.0, 0.0]));
        assert!(!all_finite(&[1.0, f64::NAN]));
        assert!(!all_finite(&[f64::NEG_INFINITY]));
        assert!(all_finite(&[] as &[f64]));
    }

    #[test]
    fn test_warn_once_does_not_panic() {
        warn_once("repeated message");
        warn_once("repeated message");
    }
}
