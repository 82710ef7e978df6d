//! SQL identifier handling.

use crate::error::{Result, StorageError};

/// PostgreSQL truncates identifiers beyond this many bytes.
pub const MAX_IDENTIFIER_BYTES: usize = 63;

/// Check that `name` can be used verbatim as a table or column name.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StorageError::invalid_identifier(name, "empty name"));
    }
    if name.len() > MAX_IDENTIFIER_BYTES {
        return Err(StorageError::invalid_identifier(
            name,
            format!("longer than {MAX_IDENTIFIER_BYTES} bytes"),
        ));
    }
    if name.contains('\0') {
        return Err(StorageError::invalid_identifier(name, "contains NUL"));
    }
    Ok(())
}

/// Quote an identifier, preserving case.
pub fn quote_ident(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}
