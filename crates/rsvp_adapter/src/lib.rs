#![forbid(unsafe_code)]

//! HTTP surface for the RSVP service: public submission, admin queries, CORS and
//! the JSON error envelope.

pub mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, ConnectInfo, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{SubsecRound, Utc};
use rsvp_engines::admin_auth::SharedSecretAuthenticator;
use rsvp_engines::rsvp_csv::RsvpCsvRenderer;
use rsvp_engines::rsvp_intake::RsvpIntakeRuntime;
use rsvp_kernel_contracts::admin::{AdminCredentials, ClearConfirmation, ExportFormat};
use rsvp_kernel_contracts::rsvp::{RequestAudit, RsvpRecord};
use rsvp_os::rsvp_admin::{parse_export_format, AdminExport, AuthenticatedAdmin, RsvpAdminWiring};
use rsvp_os::rsvp_submission::RsvpSubmissionWiring;
use rsvp_os::RsvpServiceError;
use rsvp_storage::{KvStore, RsvpRepo};
use serde::Serialize;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

pub use config::{ConfigError, CorsOrigin, RsvpAdapterConfig};

const CORS_ALLOW_METHODS: &str = "GET,POST,OPTIONS";
const CORS_ALLOW_HEADERS: &str = "Content-Type, Authorization";
const CORS_MAX_AGE_SECS: &str = "86400";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Service(#[from] RsvpServiceError),
    #[error("failed to save rsvp")]
    SaveFailed(#[source] RsvpServiceError),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("method not allowed")]
    MethodNotAllowed,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    ok: bool,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Service(RsvpServiceError::Unauthorized) => {
                (StatusCode::UNAUTHORIZED, self.to_string())
            }
            ApiError::Service(RsvpServiceError::StoreFailure(err)) => {
                error!("rsvp store failure: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "store unavailable".to_string(),
                )
            }
            ApiError::Service(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            // Logged with the record id where the write was attempted.
            ApiError::SaveFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            ApiError::InvalidQuery(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::MethodNotAllowed => (StatusCode::METHOD_NOT_ALLOWED, self.to_string()),
        };
        (
            status,
            Json(ErrorBody {
                ok: false,
                error: message,
            }),
        )
            .into_response()
    }
}

/// Shared per-process handler state. Holds no mutable request state.
#[derive(Clone)]
pub struct AppState {
    submission: Arc<RsvpSubmissionWiring>,
    admin: Arc<RsvpAdminWiring<SharedSecretAuthenticator>>,
    cors_origin: CorsOrigin,
    store_tag: &'static str,
}

impl AppState {
    pub fn new(config: &RsvpAdapterConfig, store: Arc<dyn KvStore>) -> Self {
        let store_tag = store.backend_tag();
        let repo = RsvpRepo::new(store, config.list_page_size);
        let auth = SharedSecretAuthenticator::new(config.admin_token.as_deref());
        if !auth.is_configured() {
            warn!("no admin secret configured; every admin request will be rejected");
        }
        Self {
            submission: Arc::new(RsvpSubmissionWiring::new(
                RsvpIntakeRuntime::new(config.intake),
                repo.clone(),
            )),
            admin: Arc::new(RsvpAdminWiring::new(
                auth,
                repo,
                RsvpCsvRenderer::new(config.csv.clone()),
            )),
            cors_origin: config.cors_origin,
            store_tag,
        }
    }

    fn authenticate(
        &self,
        headers: &HeaderMap,
        key_param: Option<&str>,
    ) -> Result<AuthenticatedAdmin, ApiError> {
        let authorization = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let credentials = AdminCredentials::from_request_parts(authorization, key_param);
        Ok(self.admin.authenticate(&credentials)?)
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/rsvp",
            post(submit_rsvp)
                .get(admin_query)
                .options(preflight)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/rsvp/export",
            get(export_rsvp)
                .options(preflight)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/rsvp.csv",
            get(export_csv_alias)
                .options(preflight)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/rsvp/clear",
            post(clear_rsvp)
                .options(preflight)
                .fallback(method_not_allowed),
        )
        .route("/healthz", get(healthz).fallback(method_not_allowed))
        .layer(middleware::from_fn_with_state(state.clone(), apply_cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn apply_cors(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let origin = request.headers().get(header::ORIGIN).cloned();
    let mut response = next.run(request).await;
    let allow_origin = match (state.cors_origin, origin) {
        (CorsOrigin::Echo, Some(origin)) => origin,
        _ => HeaderValue::from_static("*"),
    };
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);
    if state.cors_origin == CorsOrigin::Echo {
        headers.append(header::VARY, HeaderValue::from_static("Origin"));
    }
    response
}

async fn preflight() -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [
            (header::ACCESS_CONTROL_ALLOW_METHODS, CORS_ALLOW_METHODS),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, CORS_ALLOW_HEADERS),
            (header::ACCESS_CONTROL_MAX_AGE, CORS_MAX_AGE_SECS),
        ],
    )
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

#[derive(Debug, Serialize)]
struct HealthBody {
    ok: bool,
    store: &'static str,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthBody> {
    Json(HealthBody {
        ok: true,
        store: state.store_tag,
    })
}

#[derive(Debug, Serialize)]
struct SubmitBody {
    ok: bool,
    id: String,
}

async fn submit_rsvp(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SubmitBody>, ApiError> {
    let peer_ip = connect_info.map(|ConnectInfo(addr)| addr.ip().to_string());
    let audit = RequestAudit::v1(
        client_ip(&headers).or(peer_ip.as_deref()),
        headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok()),
    );
    let now = Utc::now().trunc_subsecs(3);
    let ok = state
        .submission
        .submit(&body, audit, now)
        .await
        .map_err(|err| match err {
            RsvpServiceError::StoreFailure(_) => ApiError::SaveFailed(err),
            other => ApiError::Service(other),
        })?;
    Ok(Json(SubmitBody {
        ok: true,
        id: ok.id.to_string(),
    }))
}

/// First non-blank client address from the usual proxy headers.
fn client_ip(headers: &HeaderMap) -> Option<&str> {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    header_str("cf-connecting-ip")
        .or_else(|| {
            header_str("x-forwarded-for")
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        })
        .or_else(|| header_str("x-real-ip"))
}

type AdminQueryPairs = Result<Query<Vec<(String, String)>>, QueryRejection>;

/// Raw admin query pairs. `key` is read for authentication before the rest of the
/// query is interpreted, so a malformed query never preempts the 401.
#[derive(Debug)]
struct AdminParams {
    pairs: Vec<(String, String)>,
    rejection: Option<String>,
}

#[derive(Debug, Default)]
struct AdminQuery {
    list: Option<String>,
    ping: Option<String>,
    cursor: Option<String>,
    format: Option<String>,
    confirm: Option<String>,
}

impl AdminParams {
    fn new(query: AdminQueryPairs) -> Self {
        match query {
            Ok(Query(pairs)) => Self {
                pairs,
                rejection: None,
            },
            Err(rejection) => Self {
                pairs: Vec::new(),
                rejection: Some(rejection.body_text()),
            },
        }
    }

    /// The `key` parameter, only when it was sent exactly once.
    fn key(&self) -> Option<&str> {
        let mut keys = self.pairs.iter().filter(|(name, _)| name == "key");
        match (keys.next(), keys.next()) {
            (Some((_, value)), None) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Unknown parameters are ignored; a repeated known parameter is refused.
    fn parse(self) -> Result<AdminQuery, ApiError> {
        if let Some(reason) = self.rejection {
            return Err(ApiError::InvalidQuery(reason));
        }
        let mut query = AdminQuery::default();
        for (name, value) in self.pairs {
            let slot = match name.as_str() {
                "list" => &mut query.list,
                "ping" => &mut query.ping,
                "cursor" => &mut query.cursor,
                "format" => &mut query.format,
                "confirm" => &mut query.confirm,
                _ => continue,
            };
            if slot.is_some() {
                return Err(ApiError::InvalidQuery(format!(
                    "duplicate parameter `{name}`"
                )));
            }
            *slot = Some(value);
        }
        Ok(query)
    }
}

fn flag_set(raw: Option<&str>) -> bool {
    match raw.map(str::trim) {
        None | Some("") | Some("0") => false,
        Some(v) => !v.eq_ignore_ascii_case("false"),
    }
}

#[derive(Debug, Serialize)]
struct OkBody {
    ok: bool,
}

#[derive(Debug, Serialize)]
struct PageBody {
    ok: bool,
    items: Vec<RsvpRecord>,
    list_complete: bool,
    cursor: Option<String>,
}

#[derive(Debug, Serialize)]
struct ClearBody {
    ok: bool,
    cleared: u64,
}

async fn admin_query(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: AdminQueryPairs,
) -> Result<Response, ApiError> {
    let params = AdminParams::new(query);
    let admin = state.authenticate(&headers, params.key())?;
    let query = params.parse()?;
    if flag_set(query.ping.as_deref()) {
        state.admin.ping(admin);
        return Ok(Json(OkBody { ok: true }).into_response());
    }
    if flag_set(query.list.as_deref()) {
        let rows = state.admin.list(admin).await?;
        return Ok(Json(rows).into_response());
    }
    let page = state.admin.page(admin, query.cursor.as_deref()).await?;
    Ok(Json(PageBody {
        ok: true,
        items: page.items,
        list_complete: page.list_complete,
        cursor: page.cursor,
    })
    .into_response())
}

async fn export_rsvp(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: AdminQueryPairs,
) -> Result<Response, ApiError> {
    let params = AdminParams::new(query);
    let admin = state.authenticate(&headers, params.key())?;
    let query = params.parse()?;
    let format = parse_export_format(query.format.as_deref())?;
    export_response(&state, admin, format).await
}

async fn export_csv_alias(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: AdminQueryPairs,
) -> Result<Response, ApiError> {
    let params = AdminParams::new(query);
    let admin = state.authenticate(&headers, params.key())?;
    params.parse()?;
    export_response(&state, admin, ExportFormat::Csv).await
}

async fn export_response(
    state: &AppState,
    admin: AuthenticatedAdmin,
    format: ExportFormat,
) -> Result<Response, ApiError> {
    let export = state.admin.export(admin, format).await?;
    let disposition = [
        (header::CONTENT_TYPE, format.content_type()),
        (header::CONTENT_DISPOSITION, format.content_disposition()),
    ];
    Ok(match export {
        AdminExport::Csv(csv) => (StatusCode::OK, disposition, csv).into_response(),
        AdminExport::Json(rows) => (StatusCode::OK, disposition, Json(rows)).into_response(),
    })
}

async fn clear_rsvp(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: AdminQueryPairs,
) -> Result<Json<ClearBody>, ApiError> {
    let params = AdminParams::new(query);
    let admin = state.authenticate(&headers, params.key())?;
    let query = params.parse()?;
    let confirmation = ClearConfirmation::from_query(query.confirm.as_deref());
    let cleared = state.admin.clear(admin, confirmation).await?;
    Ok(Json(ClearBody { ok: true, cleared }))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use rsvp_storage::MemoryKvStore;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;

    const TOKEN: &str = "s3cret";

    fn app_with(config: RsvpAdapterConfig) -> (Router, Arc<MemoryKvStore>) {
        let store = Arc::new(MemoryKvStore::new());
        let state = AppState::new(&config, store.clone());
        (build_router(state), store)
    }

    fn app() -> (Router, Arc<MemoryKvStore>) {
        let mut config = RsvpAdapterConfig::mvp_v1();
        config.admin_token = Some(TOKEN.to_string());
        app_with(config)
    }

    fn submit_request(body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/api/rsvp")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::USER_AGENT, "rsvp-test/1")
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn admin_get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(Method::GET).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body.to_vec())
    }

    async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let (status, _, body) = send(app, request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn at_adapter_01_submission_persists_with_request_metadata() {
        let (app, store) = app();
        let (status, body) = send_json(
            &app,
            submit_request(
                r#"{"name":" Maria ","attending":true,"companions":[{"name":"Leo","age":5},{"name":"","age":3}]}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        let id = body["id"].as_str().unwrap().to_string();
        assert_eq!(store.write_calls(), 1);

        let (status, rows) = send_json(&app, admin_get("/api/rsvp?list=1", Some(TOKEN))).await;
        assert_eq!(status, StatusCode::OK);
        let row = &rows[0];
        assert_eq!(row["id"], id.as_str());
        assert_eq!(row["guestName"], "Maria");
        assert_eq!(row["companions"], json!([{"name":"Leo","age":5}]));
        assert_eq!(row["companionCount"], 1);
        assert_eq!(row["sourceIp"], "203.0.113.9");
        assert_eq!(row["userAgent"], "rsvp-test/1");
        assert!(row["createdAt"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn at_adapter_02_invalid_submissions_are_400_without_writes() {
        let (app, store) = app();
        let (status, body) =
            send_json(&app, submit_request(r#"{"name":"","attending":true}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"ok": false, "error": "name is required"}));

        let (status, body) = send_json(&app, submit_request("{oops")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("invalid JSON body"));
        assert_eq!(store.write_calls(), 0);
    }

    #[tokio::test]
    async fn at_adapter_03_admin_routes_require_the_secret() {
        let (app, _store) = app();
        send(&app, submit_request(r#"{"name":"Maria"}"#)).await;
        for uri in [
            "/api/rsvp?list=1",
            "/api/rsvp?ping=1",
            "/api/rsvp",
            "/api/rsvp/export?format=json",
            "/api/rsvp.csv",
        ] {
            for token in [None, Some("wrong")] {
                let (status, _, body) = send(&app, admin_get(uri, token)).await;
                assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
                assert_eq!(body, br#"{"ok":false,"error":"unauthorized"}"#);
            }
        }

        let (status, body) =
            send_json(&app, admin_get(&format!("/api/rsvp?ping=1&key={TOKEN}"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"ok": true}));
    }

    #[tokio::test]
    async fn at_adapter_04_unconfigured_secret_rejects_admin() {
        let (app, _store) = app_with(RsvpAdapterConfig::mvp_v1());
        let (status, _, _) = send(&app, admin_get("/api/rsvp?ping=1", Some(""))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn at_adapter_05_exports_carry_attachment_headers() {
        let (app, _store) = app();
        send(&app, submit_request(r#"{"name":"Silva, João"}"#)).await;

        for uri in ["/api/rsvp/export", "/api/rsvp/export?format=csv", "/api/rsvp.csv"] {
            let (status, headers, body) = send(&app, admin_get(uri, Some(TOKEN))).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(headers[header::CONTENT_TYPE], "text/csv; charset=utf-8");
            assert_eq!(
                headers[header::CONTENT_DISPOSITION],
                "attachment; filename=\"rsvp.csv\""
            );
            let csv = String::from_utf8(body).unwrap();
            assert!(csv.starts_with("id,createdAt,guestName,"));
            assert!(csv.contains(",\"Silva, João\","));
        }

        let (status, headers, body) =
            send(&app, admin_get("/api/rsvp/export?format=json", Some(TOKEN))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"rsvp.json\""
        );
        let rows: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(rows[0]["guestName"], "Silva, João");

        let (status, body) =
            send_json(&app, admin_get("/api/rsvp/export?format=xml", Some(TOKEN))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["ok"], false);
    }

    #[tokio::test]
    async fn at_adapter_06_clear_needs_exact_confirmation() {
        let (app, _store) = app();
        for name in ["A", "B", "C"] {
            send(&app, submit_request(&format!(r#"{{"name":"{name}"}}"#))).await;
        }
        let clear = |uri: &str| {
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
                .body(Body::empty())
                .unwrap()
        };

        for uri in ["/api/rsvp/clear", "/api/rsvp/clear?confirm=yes"] {
            let (status, body) = send_json(&app, clear(uri)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], "confirmation required: pass confirm=YES");
        }
        let (_, rows) = send_json(&app, admin_get("/api/rsvp?list=1", Some(TOKEN))).await;
        assert_eq!(rows.as_array().unwrap().len(), 3);

        let (status, body) = send_json(&app, clear("/api/rsvp/clear?confirm=YES")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"ok": true, "cleared": 3}));
        let (_, rows) = send_json(&app, admin_get("/api/rsvp?list=1", Some(TOKEN))).await;
        assert_eq!(rows, json!([]));
    }

    #[tokio::test]
    async fn at_adapter_07_cursor_pages_walk_the_store() {
        let mut config = RsvpAdapterConfig::mvp_v1();
        config.admin_token = Some(TOKEN.to_string());
        config.list_page_size = 2;
        let (app, _store) = app_with(config);
        for name in ["A", "B", "C"] {
            send(&app, submit_request(&format!(r#"{{"name":"{name}"}}"#))).await;
        }

        let (status, first) = send_json(&app, admin_get("/api/rsvp", Some(TOKEN))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["items"].as_array().unwrap().len(), 2);
        assert_eq!(first["list_complete"], false);
        let cursor = first["cursor"].as_str().unwrap();

        let (_, second) = send_json(
            &app,
            admin_get(&format!("/api/rsvp?cursor={cursor}"), Some(TOKEN)),
        )
        .await;
        assert_eq!(second["items"].as_array().unwrap().len(), 1);
        assert_eq!(second["list_complete"], true);

        let (status, _) =
            send_json(&app, admin_get("/api/rsvp?cursor=bogus", Some(TOKEN))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn at_adapter_08_cors_preflight_and_allow_origin() {
        let (app, _store) = app();
        let preflight = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/rsvp")
            .header(header::ORIGIN, "https://invite.example")
            .body(Body::empty())
            .unwrap();
        let (status, headers, _) = send(&app, preflight).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "GET,POST,OPTIONS");
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_HEADERS],
            "Content-Type, Authorization"
        );

        let (_, headers, _) = send(&app, admin_get("/api/rsvp?ping=1", None)).await;
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

        let mut config = RsvpAdapterConfig::mvp_v1();
        config.cors_origin = CorsOrigin::Echo;
        let (app, _store) = app_with(config);
        let mut request = submit_request(r#"{"name":"Maria"}"#);
        request.headers_mut().insert(
            header::ORIGIN,
            HeaderValue::from_static("https://invite.example"),
        );
        let (_, headers, _) = send(&app, request).await;
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://invite.example"
        );
    }

    #[tokio::test]
    async fn at_adapter_09_unsupported_methods_are_405_json() {
        let (app, _store) = app();
        for (method, uri) in [
            (Method::PUT, "/api/rsvp"),
            (Method::DELETE, "/api/rsvp"),
            (Method::GET, "/api/rsvp/clear"),
            (Method::POST, "/api/rsvp/export"),
        ] {
            let request = Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap();
            let (status, body) = send_json(&app, request).await;
            assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{uri}");
            assert_eq!(body, json!({"ok": false, "error": "method not allowed"}));
        }
    }

    #[tokio::test]
    async fn at_adapter_10_healthz_reports_backend() {
        let (app, _store) = app();
        let (status, body) = send_json(&app, admin_get("/healthz", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"ok": true, "store": "memory"}));
    }

    #[test]
    fn at_adapter_11_client_ip_header_precedence() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), None);
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.7"));
        assert_eq!(client_ip(&headers), Some("198.51.100.7"));
        headers.insert("x-forwarded-for", HeaderValue::from_static(" 203.0.113.9 , 10.0.0.1"));
        assert_eq!(client_ip(&headers), Some("203.0.113.9"));
        headers.insert("cf-connecting-ip", HeaderValue::from_static("192.0.2.1"));
        assert_eq!(client_ip(&headers), Some("192.0.2.1"));
    }

    #[tokio::test]
    async fn at_adapter_12_malformed_admin_query_is_authenticated_first() {
        let (app, _store) = app();
        for uri in [
            "/api/rsvp?list=1&list=1",
            "/api/rsvp/export?format=csv&format=json",
            "/api/rsvp.csv?key=a&key=b",
        ] {
            let (status, headers, body) = send(&app, admin_get(uri, None)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
            assert_eq!(headers[header::CONTENT_TYPE], "application/json");
            assert_eq!(body, br#"{"ok":false,"error":"unauthorized"}"#);
        }

        let (status, headers, body) =
            send(&app, admin_get("/api/rsvp?list=1&list=1", Some(TOKEN))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            body,
            json!({"ok": false, "error": "invalid query: duplicate parameter `list`"})
        );
    }

    #[test]
    fn at_adapter_13_admin_key_must_be_unambiguous() {
        let params = |pairs: &[(&str, &str)]| AdminParams {
            pairs: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            rejection: None,
        };
        assert_eq!(params(&[("key", "s3cret")]).key(), Some("s3cret"));
        assert_eq!(params(&[("key", "a"), ("key", "a")]).key(), None);
        assert_eq!(params(&[("list", "1")]).key(), None);
        let query = params(&[("key", "s3cret"), ("list", "1"), ("utm", "x")])
            .parse()
            .unwrap();
        assert_eq!(query.list.as_deref(), Some("1"));
    }
}
