use crate::CoreError;

/// Floating point type of every quantity.
pub type Real = f64;

/// Check every entry of `values` is finite; reports the first offender.
pub fn ensure_all_finite(values: &[Real], what: &'static str) -> Result<(), CoreError> {
    match values.iter().find(|v| !v.is_finite()) {
        Some(&value) => Err(CoreError::NonFinite { what, value }),
        None => Ok(()),
    }
}

pub fn ensure_len(len: usize, expected: usize, what: &'static str) -> Result<(), CoreError> {
    if len == expected {
        Ok(())
    } else {
        Err(CoreError::DimensionMismatch {
            what,
            expected,
            actual: len,
        })
    }
}

/// Max-norm of a slice; zero for an empty slice.
pub fn inf_norm(values: &[Real]) -> Real {
    values.iter().fold(0.0, |acc, v| acc.max(v.abs()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_all_finite_reports_first_bad_value() {
        assert!(ensure_all_finite(&[1.0, 2.0], "v").is_ok());
        let err = ensure_all_finite(&[1.0, Real::INFINITY, Real::NAN], "v").unwrap_err();
        assert!(matches!(err, CoreError::NonFinite { value, .. } if value.is_infinite()));
    }

    #[test]
    fn ensure_len_mismatch() {
        assert!(ensure_len(3, 3, "be").is_ok());
        let err = ensure_len(2, 3, "be").unwrap_err();
        assert!(err.to_string().contains("expected 3, got 2"));
    }

    #[test]
    fn inf_norm_of_empty_is_zero() {
        assert_eq!(inf_norm(&[]), 0.0);
        assert_eq!(inf_norm(&[-3.0, 2.0]), 3.0);
    }
}
