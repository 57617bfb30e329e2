#![forbid(unsafe_code)]

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaVersion(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum ContractViolation {
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },
    InvalidRange {
        field: &'static str,
        min: f64,
        max: f64,
        got: f64,
    },
    TooLong {
        field: &'static str,
        max_chars: usize,
        got: usize,
    },
}

impl ContractViolation {
    pub fn field(&self) -> &'static str {
        match self {
            ContractViolation::InvalidValue { field, .. }
            | ContractViolation::InvalidRange { field, .. }
            | ContractViolation::TooLong { field, .. } => field,
        }
    }
}

impl fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractViolation::InvalidValue { field, reason } => write!(f, "{field} {reason}"),
            ContractViolation::InvalidRange {
                field,
                min,
                max,
                got,
            } => write!(f, "{field} must be within {min}..={max} (got {got})"),
            ContractViolation::TooLong {
                field,
                max_chars,
                got,
            } => write!(f, "{field} must be at most {max_chars} characters (got {got})"),
        }
    }
}

impl std::error::Error for ContractViolation {}

pub trait Validate {
    fn validate(&self) -> Result<(), ContractViolation>;
}

/// Checks a trimmed, bounded free-text value. Empty is allowed only when `required` is false.
pub fn validate_text(
    field: &'static str,
    value: &str,
    max_chars: usize,
    required: bool,
) -> Result<(), ContractViolation> {
    if value.trim() != value {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must be trimmed",
        });
    }
    if required && value.is_empty() {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must not be empty",
        });
    }
    let chars = value.chars().count();
    if chars > max_chars {
        return Err(ContractViolation::TooLong {
            field,
            max_chars,
            got: chars,
        });
    }
    if value.chars().any(|c| c.is_control() && c != '\n' && c != '\r' && c != '\t') {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must not contain control characters",
        });
    }
    Ok(())
}

/// Best-effort repair of stored free text: trims, drops control characters other than
/// `\n`, `\r` and `\t`, and truncates to `max_chars`. Blank results become `None`.
pub fn clip_text(value: &str, max_chars: usize) -> Option<String> {
    let clipped: String = value
        .trim()
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .take(max_chars)
        .collect();
    let clipped = clipped.trim();
    (!clipped.is_empty()).then(|| clipped.to_string())
}
