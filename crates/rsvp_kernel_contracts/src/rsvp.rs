#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::validate_text;
use crate::{ContractViolation, SchemaVersion, Validate};

pub const RSVP_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

/// Namespace prefix for every record key in the store.
pub const RSVP_KEY_PREFIX: &str = "rsvp:";

pub const RSVP_ID_MAX_CHARS: usize = 128;
pub const GUEST_NAME_MAX_CHARS: usize = 120;
pub const COMPANION_NAME_MAX_CHARS: usize = 120;
pub const COMPANION_AGE_MAX: u32 = 150;
pub const COMPANIONS_MAX: usize = 30;
pub const COMPANION_COUNT_MAX: u32 = 100;
pub const ADULTS_MAX: u32 = 100;
pub const CONTACT_PHONE_MAX_CHARS: usize = 40;
pub const NOTE_MAX_CHARS: usize = 2000;
pub const SOURCE_IP_MAX_CHARS: usize = 64;
pub const USER_AGENT_MAX_CHARS: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RsvpId(String);

impl RsvpId {
    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let id = Self(id.into());
        id.validate()?;
        Ok(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Store key for this record: `rsvp:<id>`.
    pub fn storage_key(&self) -> String {
        format!("{RSVP_KEY_PREFIX}{}", self.0)
    }

    /// Inverse of [`RsvpId::storage_key`]; `None` for keys outside the namespace.
    pub fn from_storage_key(key: &str) -> Option<Self> {
        key.strip_prefix(RSVP_KEY_PREFIX)
            .and_then(|raw| RsvpId::new(raw).ok())
    }
}

impl Validate for RsvpId {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "rsvp_id",
                reason: "must not be empty",
            });
        }
        if self.0.len() > RSVP_ID_MAX_CHARS {
            return Err(ContractViolation::TooLong {
                field: "rsvp_id",
                max_chars: RSVP_ID_MAX_CHARS,
                got: self.0.len(),
            });
        }
        if !self
            .0
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(ContractViolation::InvalidValue {
                field: "rsvp_id",
                reason: "must contain only ascii alphanumerics, '-' or '_'",
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for RsvpId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Companion {
    pub name: String,
    pub age: u32,
}

impl Companion {
    pub fn v1(name: String, age: u32) -> Result<Self, ContractViolation> {
        let companion = Self { name, age };
        companion.validate()?;
        Ok(companion)
    }

    /// Whole years from a loosely typed age: `5.7` → 5. Missing, non-finite,
    /// negative or out-of-range values become 0.
    pub fn age_from_number(raw: Option<f64>) -> u32 {
        match raw {
            Some(age) if age.is_finite() && (0.0..=COMPANION_AGE_MAX as f64).contains(&age) => {
                age.trunc() as u32
            }
            _ => 0,
        }
    }

    /// `Leo(5)`, the flattened form used by exports.
    pub fn display_label(&self) -> String {
        format!("{}({})", self.name, self.age)
    }
}

impl Validate for Companion {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_text(
            "companion.name",
            &self.name,
            COMPANION_NAME_MAX_CHARS,
            true,
        )?;
        if self.age > COMPANION_AGE_MAX {
            return Err(ContractViolation::InvalidRange {
                field: "companion.age",
                min: 0.0,
                max: COMPANION_AGE_MAX as f64,
                got: self.age as f64,
            });
        }
        Ok(())
    }
}

/// Guest-supplied part of an RSVP after boundary normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsvpSubmission {
    pub schema_version: SchemaVersion,
    pub guest_name: String,
    pub attending: bool,
    pub adults: Option<u32>,
    pub companions: Vec<Companion>,
    pub companion_count: u32,
    pub contact_phone: Option<String>,
    pub note: Option<String>,
}

impl RsvpSubmission {
    #[allow(clippy::too_many_arguments)]
    pub fn v1(
        guest_name: String,
        attending: bool,
        adults: Option<u32>,
        companions: Vec<Companion>,
        companion_count_override: Option<u32>,
        contact_phone: Option<String>,
        note: Option<String>,
    ) -> Result<Self, ContractViolation> {
        let companion_count =
            companion_count_override.unwrap_or(companions.len().min(u32::MAX as usize) as u32);
        let submission = Self {
            schema_version: RSVP_CONTRACT_VERSION,
            guest_name,
            attending,
            adults,
            companions,
            companion_count,
            contact_phone,
            note,
        };
        submission.validate()?;
        Ok(submission)
    }
}

impl Validate for RsvpSubmission {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != RSVP_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "rsvp_submission.schema_version",
                reason: "must match RSVP_CONTRACT_VERSION",
            });
        }
        validate_guest_fields(
            &self.guest_name,
            self.adults,
            &self.companions,
            self.companion_count,
            self.contact_phone.as_deref(),
            self.note.as_deref(),
        )
    }
}

/// Audit metadata captured from the request, never supplied by the guest.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestAudit {
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestAudit {
    /// Trims, drops blanks and truncates oversized header values instead of refusing the request.
    pub fn v1(source_ip: Option<&str>, user_agent: Option<&str>) -> Self {
        Self {
            source_ip: clip_header_value(source_ip, SOURCE_IP_MAX_CHARS),
            user_agent: clip_header_value(user_agent, USER_AGENT_MAX_CHARS),
        }
    }
}

fn clip_header_value(raw: Option<&str>, max_chars: usize) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        return None;
    }
    let clipped: String = trimmed
        .chars()
        .filter(|c| !c.is_control())
        .take(max_chars)
        .collect();
    Some(clipped.trim_end().to_string()).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RsvpRecord {
    pub id: RsvpId,
    pub created_at: DateTime<Utc>,
    pub guest_name: String,
    pub attending: bool,
    pub adults: Option<u32>,
    pub companions: Vec<Companion>,
    pub companion_count: u32,
    pub contact_phone: Option<String>,
    pub note: Option<String>,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RsvpRecord {
    pub fn v1(
        id: RsvpId,
        created_at: DateTime<Utc>,
        submission: RsvpSubmission,
        audit: RequestAudit,
    ) -> Result<Self, ContractViolation> {
        let record = Self {
            id,
            created_at,
            guest_name: submission.guest_name,
            attending: submission.attending,
            adults: submission.adults,
            companions: submission.companions,
            companion_count: submission.companion_count,
            contact_phone: submission.contact_phone,
            note: submission.note,
            source_ip: audit.source_ip,
            user_agent: audit.user_agent,
        };
        record.validate()?;
        Ok(record)
    }

    pub fn storage_key(&self) -> String {
        self.id.storage_key()
    }

    pub fn companions_label(&self) -> String {
        self.companions
            .iter()
            .map(Companion::display_label)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl Validate for RsvpRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.id.validate()?;
        validate_guest_fields(
            &self.guest_name,
            self.adults,
            &self.companions,
            self.companion_count,
            self.contact_phone.as_deref(),
            self.note.as_deref(),
        )?;
        if let Some(ip) = &self.source_ip {
            validate_text("rsvp_record.source_ip", ip, SOURCE_IP_MAX_CHARS, true)?;
        }
        if let Some(ua) = &self.user_agent {
            validate_text("rsvp_record.user_agent", ua, USER_AGENT_MAX_CHARS, true)?;
        }
        Ok(())
    }
}

fn validate_guest_fields(
    guest_name: &str,
    adults: Option<u32>,
    companions: &[Companion],
    companion_count: u32,
    contact_phone: Option<&str>,
    note: Option<&str>,
) -> Result<(), ContractViolation> {
    validate_text("guest_name", guest_name, GUEST_NAME_MAX_CHARS, true)?;
    if let Some(adults) = adults {
        if adults > ADULTS_MAX {
            return Err(ContractViolation::InvalidRange {
                field: "adults",
                min: 0.0,
                max: ADULTS_MAX as f64,
                got: adults as f64,
            });
        }
    }
    if companions.len() > COMPANIONS_MAX {
        return Err(ContractViolation::InvalidRange {
            field: "companions",
            min: 0.0,
            max: COMPANIONS_MAX as f64,
            got: companions.len() as f64,
        });
    }
    for companion in companions {
        companion.validate()?;
    }
    if (companion_count as usize) < companions.len() {
        return Err(ContractViolation::InvalidValue {
            field: "companion_count",
            reason: "must not be smaller than the number of named companions",
        });
    }
    if companion_count > COMPANION_COUNT_MAX {
        return Err(ContractViolation::InvalidRange {
            field: "companion_count",
            min: 0.0,
            max: COMPANION_COUNT_MAX as f64,
            got: companion_count as f64,
        });
    }
    if let Some(phone) = contact_phone {
        validate_text("contact_phone", phone, CONTACT_PHONE_MAX_CHARS, true)?;
    }
    if let Some(note) = note {
        validate_text("note", note, NOTE_MAX_CHARS, true)?;
    }
    Ok(())
}
