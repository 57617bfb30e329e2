#![forbid(unsafe_code)]

use std::time::Duration;

use rsvp_kernel_contracts::admin::{ExportFormat, CLEAR_CONFIRMATION_TOKEN};
use serde_json::Value;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8787";
pub const USAGE: &str = "usage: rsvp <ping|list|export [csv|json]|clear --confirm>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

/// Admin API transport. Paths include the query string.
pub trait AdminTransport {
    fn get(&self, path: &str) -> Result<HttpReply, String>;
    fn post(&self, path: &str) -> Result<HttpReply, String>;
}

pub struct UreqTransport {
    agent: ureq::Agent,
    base_url: String,
    token: String,
}

impl UreqTransport {
    pub fn new(base_url: &str, token: String) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(30))
                .build(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn send(&self, method: &str, path: &str) -> Result<HttpReply, String> {
        let url = format!("{}{path}", self.base_url);
        let result = self
            .agent
            .request(method, &url)
            .set("Authorization", &format!("Bearer {}", self.token))
            .call();
        let response = match result {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(err) => return Err(format!("request to {url} failed: {err}")),
        };
        let status = response.status();
        let body = response
            .into_string()
            .map_err(|e| format!("failed to read response from {url}: {e}"))?;
        Ok(HttpReply { status, body })
    }
}

impl AdminTransport for UreqTransport {
    fn get(&self, path: &str) -> Result<HttpReply, String> {
        self.send("GET", path)
    }

    fn post(&self, path: &str) -> Result<HttpReply, String> {
        self.send("POST", path)
    }
}

pub fn execute_admin_command<T: AdminTransport>(
    transport: &T,
    subcommand: &str,
    args: &[String],
) -> Result<String, String> {
    match subcommand {
        "ping" => {
            expect_ok(transport.get("/api/rsvp?ping=1")?)?;
            Ok("OK".to_string())
        }
        "list" => {
            let body = expect_ok(transport.get("/api/rsvp?list=1")?)?;
            let rows: Vec<Value> =
                serde_json::from_str(&body).map_err(|e| format!("unexpected list body: {e}"))?;
            Ok(rows.iter().map(summary_line).collect::<Vec<_>>().join("\n"))
        }
        "export" => {
            let raw = args.first().map(String::as_str);
            let format = ExportFormat::parse(raw).ok_or_else(|| {
                format!(
                    "unknown export format '{}'. expected one of: csv, json",
                    raw.unwrap_or_default()
                )
            })?;
            expect_ok(transport.get(&format!("/api/rsvp/export?format={}", format.as_str()))?)
        }
        "clear" => {
            if !args.iter().any(|a| a == "--confirm") {
                return Err("refusing to clear without --confirm".to_string());
            }
            let body = expect_ok(
                transport.post(&format!("/api/rsvp/clear?confirm={CLEAR_CONFIRMATION_TOKEN}"))?,
            )?;
            let reply: Value =
                serde_json::from_str(&body).map_err(|e| format!("unexpected clear body: {e}"))?;
            Ok(format!("cleared {}", reply["cleared"].as_u64().unwrap_or(0)))
        }
        _ => Err(format!(
            "unknown subcommand: {subcommand}. expected one of: ping, list, export, clear"
        )),
    }
}

fn expect_ok(reply: HttpReply) -> Result<String, String> {
    match reply.status {
        200..=299 => Ok(reply.body),
        401 => Err("unauthorized: check RSVP_ADMIN_TOKEN".to_string()),
        status => {
            let detail = serde_json::from_str::<Value>(&reply.body)
                .ok()
                .and_then(|v| v["error"].as_str().map(str::to_string))
                .unwrap_or_else(|| reply.body.trim().to_string());
            Err(format!("server returned {status}: {detail}"))
        }
    }
}

/// `createdAt<TAB>yes|no<TAB>+companions<TAB>guestName`
fn summary_line(row: &Value) -> String {
    let attending = if row["attending"].as_bool().unwrap_or(false) {
        "yes"
    } else {
        "no"
    };
    format!(
        "{}\t{}\t+{}\t{}",
        row["createdAt"].as_str().unwrap_or("-"),
        attending,
        row["companionCount"].as_u64().unwrap_or(0),
        row["guestName"].as_str().unwrap_or("")
    )
}
