use once_cell::sync::Lazy;
use regex::Regex;

use crate::{Result, SolDocsError};

/// Base58 alphabet, 32-44 characters: the shape of every Solana address.
static PROGRAM_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[1-9A-HJ-NP-Za-km-z]{32,44}$").expect("program id regex"));

pub fn is_valid_program_id(id: &str) -> bool {
    PROGRAM_ID_RE.is_match(id)
}

/// Every store entry point calls this before touching disk.
pub fn validate_program_id(id: &str) -> Result<()> {
    if is_valid_program_id(id) {
        Ok(())
    } else {
        Err(SolDocsError::Validation(format!(
            "Invalid program id: {id:?}"
        )))
    }
}
