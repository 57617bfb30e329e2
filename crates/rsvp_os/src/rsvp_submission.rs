#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use rsvp_engines::rsvp_intake::RsvpIntakeRuntime;
use rsvp_kernel_contracts::rsvp::{RequestAudit, RsvpId, RsvpRecord};
use rsvp_storage::RsvpRepo;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::RsvpServiceError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionOk {
    pub id: RsvpId,
    pub created_at: DateTime<Utc>,
}

/// Public submission path: normalize, stamp, persist. Exactly one store write on success,
/// none on refusal.
#[derive(Clone)]
pub struct RsvpSubmissionWiring {
    intake: RsvpIntakeRuntime,
    repo: RsvpRepo,
}

impl RsvpSubmissionWiring {
    pub fn new(intake: RsvpIntakeRuntime, repo: RsvpRepo) -> Self {
        Self { intake, repo }
    }

    pub async fn submit(
        &self,
        body: &[u8],
        audit: RequestAudit,
        now: DateTime<Utc>,
    ) -> Result<SubmissionOk, RsvpServiceError> {
        let submission = self.intake.normalize(body).map_err(|refuse| {
            info!(reason = %refuse, "rsvp submission refused");
            RsvpServiceError::from(refuse)
        })?;

        let id = new_rsvp_id(now)?;
        let record = RsvpRecord::v1(id.clone(), now, submission, audit)?;
        if let Err(err) = self.repo.insert_rsvp_row(&record).await {
            error!(id = %id, backend = self.repo.backend_tag(), "rsvp write failed: {err}");
            return Err(err.into());
        }
        info!(
            id = %id,
            attending = record.attending,
            companion_count = record.companion_count,
            "rsvp accepted"
        );
        Ok(SubmissionOk {
            id,
            created_at: now,
        })
    }
}

/// `<base36 millis>-<uuid v4>`: sorts roughly by time, unique without coordination.
pub fn new_rsvp_id(now: DateTime<Utc>) -> Result<RsvpId, RsvpServiceError> {
    let millis = u64::try_from(now.timestamp_millis()).unwrap_or(0);
    Ok(RsvpId::new(format!("{}-{}", base36(millis), Uuid::new_v4()))?)
}

fn base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}
