#![forbid(unsafe_code)]

use std::borrow::Cow;

use chrono::SecondsFormat;
use rsvp_kernel_contracts::rsvp::RsvpRecord;

pub const RSVP_CSV_HEADER: [&str; 11] = [
    "id",
    "createdAt",
    "guestName",
    "attending",
    "adults",
    "companionCount",
    "companions",
    "contactPhone",
    "note",
    "sourceIp",
    "userAgent",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsvpCsvConfig {
    pub yes_token: String,
    pub no_token: String,
}

impl RsvpCsvConfig {
    pub fn mvp_v1() -> Self {
        Self {
            yes_token: "yes".to_string(),
            no_token: "no".to_string(),
        }
    }
}

impl Default for RsvpCsvConfig {
    fn default() -> Self {
        Self::mvp_v1()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RsvpCsvRenderer {
    config: RsvpCsvConfig,
}

impl RsvpCsvRenderer {
    pub fn new(config: RsvpCsvConfig) -> Self {
        Self { config }
    }

    /// Header row plus one row per record, `\n`-separated, in the given order.
    pub fn render(&self, rows: &[RsvpRecord]) -> String {
        let mut lines = Vec::with_capacity(rows.len() + 1);
        lines.push(RSVP_CSV_HEADER.join(","));
        for row in rows {
            lines.push(self.render_row(row));
        }
        lines.join("\n")
    }

    fn render_row(&self, row: &RsvpRecord) -> String {
        let attending = if row.attending {
            self.config.yes_token.as_str()
        } else {
            self.config.no_token.as_str()
        };
        let created_at = row.created_at.to_rfc3339_opts(SecondsFormat::Millis, true);
        let adults = row.adults.map(|a| a.to_string()).unwrap_or_default();
        let companion_count = row.companion_count.to_string();
        let companions = row.companions_label();

        let cells: [&str; 11] = [
            row.id.as_str(),
            &created_at,
            &row.guest_name,
            attending,
            &adults,
            &companion_count,
            &companions,
            row.contact_phone.as_deref().unwrap_or(""),
            row.note.as_deref().unwrap_or(""),
            row.source_ip.as_deref().unwrap_or(""),
            row.user_agent.as_deref().unwrap_or(""),
        ];
        cells
            .iter()
            .map(|c| csv_cell(c))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Quotes a cell containing a comma, quote, CR or LF; inner quotes are doubled.
pub fn csv_cell(raw: &str) -> Cow<'_, str> {
    if raw.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", raw.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(raw)
    }
}
