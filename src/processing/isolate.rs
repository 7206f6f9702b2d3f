//! Per-element fault isolation.
//!
//! Turns a fallible per-element function into a total one whose failure case carries the
//! original input next to the captured fault, ready to be published as an [`ErrorRow`].

use crate::error::BoxError;
use crate::types::{ErrorRow, FaultInfo};

/// Wrap `f` so that a failure yields the offending input paired with its fault.
pub fn isolate<T, U, E, F>(mut f: F) -> impl FnMut(&T) -> Result<U, ErrorRow<T>>
where
    T: Clone,
    E: Into<BoxError>,
    F: FnMut(&T) -> Result<U, E>,
{
    move |value: &T| f(value).map_err(|e| to_error_row(value, e.into()))
}

/// Index-aware variant of [`isolate`]; the index is passed through unchanged.
pub fn isolate_indexed<T, U, E, F>(mut f: F) -> impl FnMut(&T, usize) -> Result<U, ErrorRow<T>>
where
    T: Clone,
    E: Into<BoxError>,
    F: FnMut(&T, usize) -> Result<U, E>,
{
    move |value: &T, index: usize| f(value, index).map_err(|e| to_error_row(value, e.into()))
}

fn to_error_row<T: Clone>(value: &T, error: BoxError) -> ErrorRow<T> {
    ErrorRow::new(value.clone(), FaultInfo::from_error(&*error))
}

#[cfg(test)]
mod tests {
    use super::{isolate, isolate_indexed};

    #[test]
    fn success_passes_mapped_value() {
        let mut f = isolate(|x: &i32| Ok::<_, String>(x * 2));
        assert_eq!(f(&21).ok(), Some(42));
    }

    #[test]
    fn failure_keeps_original_input() {
        let mut f = isolate(|s: &String| s.parse::<i32>());
        let row = f(&"abc".to_string()).unwrap_err();
        assert_eq!(row.source_value, "abc");
        assert_eq!(row.fault.message, "invalid digit found in string");
    }

    #[test]
    fn indexed_variant_sees_index() {
        let mut f = isolate_indexed(|x: &i32, idx: usize| {
            if idx == 1 {
                Err("second element rejected")
            } else {
                Ok(x + idx as i32)
            }
        });
        assert_eq!(f(&10, 0).ok(), Some(10));
        let row = f(&10, 1).unwrap_err();
        assert_eq!(row.source_value, 10);
        assert_eq!(row.fault.message, "second element rejected");
    }
}
