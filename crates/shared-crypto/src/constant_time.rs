//! Constant-time comparison for digests and signatures.

use subtle::ConstantTimeEq;

/// Compare two byte strings without an early exit on the first mismatch.
///
/// Length is not secret: slices of different length compare unequal
/// immediately.
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_slices() {
        assert!(constant_time_compare(&[1, 2, 3], &[1, 2, 3]));
    }

    #[test]
    fn test_mismatch_at_any_position() {
        let base = [0u8; 32];
        for i in 0..32 {
            let mut other = base;
            other[i] = 1;
            assert!(!constant_time_compare(&base, &other));
        }
    }

    #[test]
    fn test_length_mismatch() {
        assert!(!constant_time_compare(&[1, 2], &[1, 2, 3]));
        assert!(constant_time_compare(&[], &[]));
    }
}
