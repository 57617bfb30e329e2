#![forbid(unsafe_code)]

use rsvp_engines::admin_auth::SharedSecretAuthenticator;
use rsvp_engines::rsvp_csv::RsvpCsvRenderer;
use rsvp_kernel_contracts::admin::{AdminCredentials, ClearConfirmation, ExportFormat};
use rsvp_kernel_contracts::rsvp::RsvpRecord;
use rsvp_storage::{RsvpPage, RsvpRepo};
use tracing::{info, warn};

use crate::error::RsvpServiceError;

pub trait AdminAuthenticator: Send + Sync {
    fn authenticate(&self, credentials: &AdminCredentials) -> bool;
}

impl AdminAuthenticator for SharedSecretAuthenticator {
    fn authenticate(&self, credentials: &AdminCredentials) -> bool {
        self.verify(credentials.presented_secret())
    }
}

/// Proof that a request passed the admin check. Admin operations require one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedAdmin {
    _private: (),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminExport {
    Csv(String),
    Json(Vec<RsvpRecord>),
}

impl AdminExport {
    pub fn format(&self) -> ExportFormat {
        match self {
            AdminExport::Csv(_) => ExportFormat::Csv,
            AdminExport::Json(_) => ExportFormat::Json,
        }
    }
}

pub fn parse_export_format(raw: Option<&str>) -> Result<ExportFormat, RsvpServiceError> {
    ExportFormat::parse(raw)
        .ok_or_else(|| RsvpServiceError::UnsupportedFormat(raw.unwrap_or_default().to_string()))
}

#[derive(Clone)]
pub struct RsvpAdminWiring<A>
where
    A: AdminAuthenticator,
{
    auth: A,
    repo: RsvpRepo,
    csv: RsvpCsvRenderer,
}

impl<A> RsvpAdminWiring<A>
where
    A: AdminAuthenticator,
{
    pub fn new(auth: A, repo: RsvpRepo, csv: RsvpCsvRenderer) -> Self {
        Self { auth, repo, csv }
    }

    pub fn authenticate(
        &self,
        credentials: &AdminCredentials,
    ) -> Result<AuthenticatedAdmin, RsvpServiceError> {
        if self.auth.authenticate(credentials) {
            Ok(AuthenticatedAdmin { _private: () })
        } else {
            warn!(
                presented = credentials.presented_secret().is_some(),
                "admin request rejected"
            );
            Err(RsvpServiceError::Unauthorized)
        }
    }

    /// Liveness of the admin path only; the store is not touched.
    pub fn ping(&self, _admin: AuthenticatedAdmin) {}

    /// Every decodable row, newest first.
    pub async fn list(
        &self,
        _admin: AuthenticatedAdmin,
    ) -> Result<Vec<RsvpRecord>, RsvpServiceError> {
        let rows = self.repo.list_rsvp_rows().await?;
        info!(rows = rows.len(), "rsvp list served");
        Ok(rows)
    }

    /// One store page in key order, for callers that walk the cursor themselves.
    pub async fn page(
        &self,
        _admin: AuthenticatedAdmin,
        cursor: Option<&str>,
    ) -> Result<RsvpPage, RsvpServiceError> {
        let cursor = cursor.filter(|c| !c.is_empty());
        Ok(self.repo.rsvp_page(cursor).await?)
    }

    pub async fn export(
        &self,
        admin: AuthenticatedAdmin,
        format: ExportFormat,
    ) -> Result<AdminExport, RsvpServiceError> {
        let rows = self.list(admin).await?;
        Ok(match format {
            ExportFormat::Csv => AdminExport::Csv(self.csv.render(&rows)),
            ExportFormat::Json => AdminExport::Json(rows),
        })
    }

    /// Deletes every row present when the clear starts. Returns the number deleted.
    pub async fn clear(
        &self,
        _admin: AuthenticatedAdmin,
        confirmation: Option<ClearConfirmation>,
    ) -> Result<u64, RsvpServiceError> {
        if confirmation.is_none() {
            return Err(RsvpServiceError::MissingConfirmation);
        }
        let cleared = self.repo.clear_rsvp_rows().await?;
        warn!(cleared, "rsvp store cleared by admin");
        Ok(cleared)
    }
}
