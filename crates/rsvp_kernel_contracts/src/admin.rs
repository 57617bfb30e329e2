#![forbid(unsafe_code)]

/// Exact value `confirm` must carry before a bulk clear runs.
pub const CLEAR_CONFIRMATION_TOKEN: &str = "YES";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    /// Missing format defaults to CSV; unknown values are refused by the caller.
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        match raw.map(str::trim) {
            None | Some("") => Some(ExportFormat::Csv),
            Some(v) if v.eq_ignore_ascii_case("csv") => Some(ExportFormat::Csv),
            Some(v) if v.eq_ignore_ascii_case("json") => Some(ExportFormat::Json),
            Some(_) => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Json => "application/json; charset=utf-8",
        }
    }

    pub fn content_disposition(self) -> &'static str {
        match self {
            ExportFormat::Csv => "attachment; filename=\"rsvp.csv\"",
            ExportFormat::Json => "attachment; filename=\"rsvp.json\"",
        }
    }
}

/// Proof that the caller sent `confirm=YES`. Only constructible from an exact match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearConfirmation {
    _private: (),
}

impl ClearConfirmation {
    pub fn from_query(raw: Option<&str>) -> Option<Self> {
        match raw {
            Some(v) if v == CLEAR_CONFIRMATION_TOKEN => Some(Self { _private: () }),
            _ => None,
        }
    }
}

/// Credentials as presented on a request, before any comparison.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct AdminCredentials {
    bearer: Option<String>,
    query_key: Option<String>,
}

impl AdminCredentials {
    pub fn from_request_parts(authorization: Option<&str>, key_param: Option<&str>) -> Self {
        Self {
            bearer: authorization.and_then(parse_bearer),
            query_key: key_param
                .map(str::to_string)
                .filter(|v| !v.is_empty()),
        }
    }

    /// The header wins when both are present.
    pub fn presented_secret(&self) -> Option<&str> {
        self.bearer.as_deref().or(self.query_key.as_deref())
    }
}

impl std::fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("bearer", &self.bearer.as_ref().map(|_| "<redacted>"))
            .field("query_key", &self.query_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn parse_bearer(header: &str) -> Option<String> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}
