//! Field validators shared by request DTOs (`#[validate(custom = "...")]`).

use lazy_static::lazy_static;
use regex::Regex;
use validator::ValidationError;

lazy_static! {
    static ref STATE_CODE: Regex = Regex::new(r"^[0-9]{2}$").expect("valid regex");
    static ref GSTIN: Regex =
        Regex::new(r"^[0-9]{2}[A-Z]{5}[0-9]{4}[A-Z][1-9A-Z]Z[0-9A-Z]$").expect("valid regex");
    static ref BRANCH_CODE: Regex = Regex::new(r"^[A-Za-z0-9]{2,10}$").expect("valid regex");
}

fn failure(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

/// Two-digit GST state code
pub fn validate_state_code(code: &str) -> Result<(), ValidationError> {
    if STATE_CODE.is_match(code) {
        Ok(())
    } else {
        Err(failure("state_code", "state code must be exactly two digits"))
    }
}

pub fn validate_gstin(gstin: &str) -> Result<(), ValidationError> {
    if GSTIN.is_match(gstin) {
        Ok(())
    } else {
        Err(failure("gstin", "GSTIN must be 15 characters in the standard format"))
    }
}

pub fn validate_branch_code(code: &str) -> Result<(), ValidationError> {
    if BRANCH_CODE.is_match(code) {
        Ok(())
    } else {
        Err(failure("code", "branch code must be 2-10 alphanumeric characters"))
    }
}

pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(failure("blank", "value is required"))
    } else {
        Ok(())
    }
}
