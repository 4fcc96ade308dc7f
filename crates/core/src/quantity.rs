//! Bounds on stock quantities.

use crate::error::{DomainError, DomainResult};

/// Largest magnitude accepted for any quantity: stock on hand, a request
/// line, an issuance or a single adjustment. Totals over many rows stay well
/// inside `i64`.
pub const MAX_QUANTITY: i64 = 1_000_000_000;

/// `InvalidInput` when `|value|` exceeds [`MAX_QUANTITY`]. Sign rules are
/// left to the caller.
pub fn ensure_bounded(field: &str, value: i64) -> DomainResult<()> {
    if value.unsigned_abs() > MAX_QUANTITY.unsigned_abs() {
        return Err(DomainError::invalid_input(format!(
            "{field} must not exceed {MAX_QUANTITY} in magnitude"
        )));
    }
    Ok(())
}
