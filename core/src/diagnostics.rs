//! Per-field conversion diagnostics collected on the read path.

use std::fmt;

use crate::error::ConversionError;

/// A stored value that could not be assigned to its field.
///
/// The field keeps its default value; the rest of the row is unaffected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDiagnostic {
    /// Table the row was read from.
    pub table: String,
    /// Column (or array table) holding the value.
    pub column: String,
    /// Zero-based position of the row within its query result.
    pub row: usize,
    pub error: ConversionError,
}

impl fmt::Display for FieldDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} (row {}): {}",
            self.table, self.column, self.row, self.error
        )
    }
}
