#![forbid(unsafe_code)]

//! Boundary normalization for RSVP payloads.
//!
//! Accepted shapes:
//! - name: `name` or `fullName`
//! - companions: `companions`, `children` or `kids`, each either an array of
//!   `{name, age}` or a bare count; `companionCount` as an explicit count
//! - contact: `phone` or `contactPhone`; message: `message` or `note`
//! - `hasChildren` / `bringsChildren` hints are ignored
//!
//! Shapes where two sources disagree are refused rather than guessed.

use rsvp_kernel_contracts::rsvp::{Companion, RsvpSubmission, COMPANION_COUNT_MAX};
use rsvp_kernel_contracts::ContractViolation;
use serde_json::{Map, Value};
use thiserror::Error;

const NAME_FIELDS: [&str; 2] = ["name", "fullName"];
const COMPANION_FIELDS: [&str; 3] = ["companions", "children", "kids"];
const PHONE_FIELDS: [&str; 2] = ["phone", "contactPhone"];
const NOTE_FIELDS: [&str; 2] = ["message", "note"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendancePolicy {
    /// Absent `attending` counts as a confirmation.
    DefaultConfirmed,
    RequireExplicit,
}

impl AttendancePolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "default_confirmed" => Some(AttendancePolicy::DefaultConfirmed),
            "require_explicit" => Some(AttendancePolicy::RequireExplicit),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttendancePolicy::DefaultConfirmed => "default_confirmed",
            AttendancePolicy::RequireExplicit => "require_explicit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RsvpIntakeConfig {
    pub attendance_policy: AttendancePolicy,
    pub name_min_chars: usize,
}

impl RsvpIntakeConfig {
    pub fn mvp_v1() -> Self {
        Self {
            attendance_policy: AttendancePolicy::DefaultConfirmed,
            name_min_chars: 1,
        }
    }
}

impl Default for RsvpIntakeConfig {
    fn default() -> Self {
        Self::mvp_v1()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntakeRefuse {
    #[error("invalid JSON body: {reason}")]
    InvalidBody { reason: String },
    #[error("{field} is required")]
    MissingRequiredField { field: &'static str },
    #[error("{field} {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
    #[error("ambiguous payload: {reason}")]
    Ambiguous { reason: &'static str },
    #[error("{0}")]
    Contract(#[from] ContractViolation),
}

impl IntakeRefuse {
    pub fn is_invalid_body(&self) -> bool {
        matches!(self, IntakeRefuse::InvalidBody { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CompanionSource {
    Listed(Vec<Companion>),
    Counted(u32),
}

#[derive(Debug, Clone)]
pub struct RsvpIntakeRuntime {
    config: RsvpIntakeConfig,
}

impl RsvpIntakeRuntime {
    pub fn new(config: RsvpIntakeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> RsvpIntakeConfig {
        self.config
    }

    pub fn normalize(&self, body: &[u8]) -> Result<RsvpSubmission, IntakeRefuse> {
        let value: Value =
            serde_json::from_slice(body).map_err(|e| IntakeRefuse::InvalidBody {
                reason: e.to_string(),
            })?;
        let Value::Object(obj) = value else {
            return Err(IntakeRefuse::InvalidBody {
                reason: "body must be a JSON object".to_string(),
            });
        };
        self.normalize_object(&obj)
    }

    fn normalize_object(&self, obj: &Map<String, Value>) -> Result<RsvpSubmission, IntakeRefuse> {
        let guest_name = aliased_text(obj, &NAME_FIELDS, "name", "name and fullName disagree")?
            .ok_or(IntakeRefuse::MissingRequiredField { field: "name" })?;
        if guest_name.chars().count() < self.config.name_min_chars {
            return Err(IntakeRefuse::InvalidField {
                field: "name",
                reason: "is too short",
            });
        }

        let attending = match obj.get("attending") {
            None | Some(Value::Null) => match self.config.attendance_policy {
                AttendancePolicy::DefaultConfirmed => true,
                AttendancePolicy::RequireExplicit => {
                    return Err(IntakeRefuse::MissingRequiredField { field: "attending" })
                }
            },
            Some(Value::Bool(b)) => *b,
            Some(_) => {
                return Err(IntakeRefuse::InvalidField {
                    field: "attending",
                    reason: "must be a boolean",
                })
            }
        };

        let adults = match obj.get("adults") {
            None | Some(Value::Null) => None,
            Some(v) => Some(coerce_count("adults", v)?),
        };

        let (companions, companion_count_override) = companions_from(obj)?;

        let contact_phone = aliased_text(
            obj,
            &PHONE_FIELDS,
            "phone",
            "phone and contactPhone disagree",
        )?;
        let note = aliased_text(obj, &NOTE_FIELDS, "message", "message and note disagree")?;

        Ok(RsvpSubmission::v1(
            guest_name,
            attending,
            adults,
            companions,
            companion_count_override,
            contact_phone,
            note,
        )?)
    }
}

/// First non-blank trimmed string among `fields`; refuses when two aliases carry
/// different values.
fn aliased_text(
    obj: &Map<String, Value>,
    fields: &[&'static str],
    canonical: &'static str,
    conflict: &'static str,
) -> Result<Option<String>, IntakeRefuse> {
    let mut found: Option<String> = None;
    for field in fields {
        let text = match obj.get(*field) {
            None | Some(Value::Null) => continue,
            Some(Value::String(s)) => s.trim(),
            Some(_) => {
                return Err(IntakeRefuse::InvalidField {
                    field: canonical,
                    reason: "must be a string",
                })
            }
        };
        if text.is_empty() {
            continue;
        }
        match &found {
            Some(prev) if prev != text => return Err(IntakeRefuse::Ambiguous { reason: conflict }),
            Some(_) => {}
            None => found = Some(text.to_string()),
        }
    }
    Ok(found)
}

fn companions_from(
    obj: &Map<String, Value>,
) -> Result<(Vec<Companion>, Option<u32>), IntakeRefuse> {
    let mut listed: Option<Vec<Companion>> = None;
    let mut counted: Option<u32> = None;

    for field in COMPANION_FIELDS {
        let source = match obj.get(field) {
            None | Some(Value::Null) => continue,
            Some(Value::Array(items)) => CompanionSource::Listed(companion_list(items)?),
            Some(v @ (Value::Number(_) | Value::String(_))) => {
                CompanionSource::Counted(coerce_count("companions", v)?)
            }
            Some(_) => {
                return Err(IntakeRefuse::InvalidField {
                    field: "companions",
                    reason: "must be an array of {name, age} or a count",
                })
            }
        };
        match source {
            CompanionSource::Listed(list) => match &listed {
                Some(prev) if !prev.is_empty() && !list.is_empty() => {
                    return Err(IntakeRefuse::Ambiguous {
                        reason: "companions listed under more than one field",
                    })
                }
                Some(prev) if !prev.is_empty() => {}
                _ => listed = Some(list),
            },
            CompanionSource::Counted(n) => merge_count(&mut counted, n)?,
        }
    }

    match obj.get("companionCount") {
        None | Some(Value::Null) => {}
        Some(v) => merge_count(&mut counted, coerce_count("companionCount", v)?)?,
    }

    let listed = listed.unwrap_or_default();
    if let Some(n) = counted {
        if (n as usize) < listed.len() {
            return Err(IntakeRefuse::InvalidField {
                field: "companionCount",
                reason: "must not be smaller than the number of named companions",
            });
        }
    }
    Ok((listed, counted))
}

fn merge_count(slot: &mut Option<u32>, n: u32) -> Result<(), IntakeRefuse> {
    match *slot {
        Some(prev) if prev != n => Err(IntakeRefuse::Ambiguous {
            reason: "companion counts disagree",
        }),
        _ => {
            *slot = Some(n);
            Ok(())
        }
    }
}

/// Entries without a usable name are dropped; ages are coerced.
fn companion_list(items: &[Value]) -> Result<Vec<Companion>, IntakeRefuse> {
    let mut out = Vec::new();
    for item in items {
        let Value::Object(entry) = item else {
            continue;
        };
        let Some(name) = entry
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|n| !n.is_empty())
        else {
            continue;
        };
        let age = entry.get("age").map(coerce_age).unwrap_or(0);
        out.push(Companion::v1(name.to_string(), age)?);
    }
    Ok(out)
}

/// `5`, `"5"`, `5.7` → 5. Anything unusable, negative or out of range → 0.
fn coerce_age(value: &Value) -> u32 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Companion::age_from_number(parsed)
}

/// Non-negative whole counts from numbers or numeric strings.
fn coerce_count(field: &'static str, value: &Value) -> Result<u32, IntakeRefuse> {
    let invalid = IntakeRefuse::InvalidField {
        field,
        reason: "must be a non-negative whole number",
    };
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(n) if n.is_finite() && n >= 0.0 && n.fract() == 0.0 => {
            if n > COMPANION_COUNT_MAX as f64 {
                Err(IntakeRefuse::InvalidField {
                    field,
                    reason: "is too large",
                })
            } else {
                Ok(n as u32)
            }
        }
        _ => Err(invalid),
    }
}
