//! Typed REST client for the flood-monitoring backend.
//!
//! One operation per resource, each returning parsed models or [`ApiError`].
//! HTTP execution sits behind the [`HttpBackend`] trait so tests can swap in
//! a canned backend without a network. A 401 on any authenticated call
//! invalidates the session store as a side effect, which is what forces the
//! UI back to the login screen.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::auth::{AuthError, Session, SessionStore};
use crate::config::{Config, ConfigError, Endpoints};
use crate::model::{Alert, ChatMessage, RiskPoint, Role, SensorReading, TokenResponse, UserInfo};

#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid api configuration: {0}")]
    InvalidConfig(String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("session rejected by backend")]
    Unauthorized,
    #[error("validation failed: {}", format_field_errors(.0))]
    Validation(Vec<FieldError>),
    #[error("http {status}: {detail}")]
    Http { status: u16, detail: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::InvalidConfig(err.to_string())
    }
}

fn format_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(FieldError::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Form(Vec<(String, String)>),
    Json(serde_json::Value),
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub bearer: Option<String>,
    pub body: RequestBody,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

#[async_trait]
pub trait HttpBackend: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError>;
}

struct ReqwestBackend {
    client: reqwest::Client,
}

impl ReqwestBackend {
    fn new() -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(Duration::from_secs(8))
            .no_proxy()
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(request.url),
            HttpMethod::Post => self.client.post(request.url),
            HttpMethod::Put => self.client.put(request.url),
        };
        if let Some(token) = request.bearer {
            builder = builder.bearer_auth(token);
        }
        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Form(fields) => builder.form(&fields),
            RequestBody::Json(value) => builder.json(&value),
        };
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}

#[derive(Clone)]
pub struct ApiClient {
    endpoints: Endpoints,
    store: SessionStore,
    backend: Arc<dyn HttpBackend>,
}

impl ApiClient {
    pub fn new(config: &Config, store: SessionStore) -> Result<Self, ApiError> {
        let backend = Arc::new(ReqwestBackend::new()?);
        Ok(Self::with_backend(config.endpoints()?, store, backend))
    }

    pub fn with_backend(
        endpoints: Endpoints,
        store: SessionStore,
        backend: Arc<dyn HttpBackend>,
    ) -> Self {
        Self {
            endpoints,
            store,
            backend,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Exchange credentials for a session. The token's claims are decoded
    /// locally, the resulting session is installed in the store, and the
    /// identity is confirmed against `/users/me` with the new bearer.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, ApiError> {
        let request = HttpRequest {
            method: HttpMethod::Post,
            url: self.endpoints.http("login")?,
            bearer: None,
            body: RequestBody::Form(vec![
                ("username".into(), username.into()),
                ("password".into(), password.into()),
            ]),
        };
        let response = self.backend.execute(request).await?;
        if response.status == 401 {
            return Err(AuthError::InvalidCredentials.into());
        }
        self.check(&response, false)?;
        let token: TokenResponse = parse_body(&response.body)?;
        let session = Session::from_token(token.access_token)?;
        self.store.set(session.clone());
        match self.me().await {
            Ok(user) => {
                if user.username != session.username || user.role != session.role {
                    warn!(
                        target: "api",
                        token_user = %session.username,
                        backend_user = %user.username,
                        "token claims disagree with /users/me"
                    );
                }
                Ok(session)
            }
            Err(err) => {
                self.store.clear();
                Err(err)
            }
        }
    }

    pub async fn register(
        &self,
        username: &str,
        password: &str,
        role: Role,
    ) -> Result<(), ApiError> {
        let request = HttpRequest {
            method: HttpMethod::Post,
            url: self.endpoints.http("register")?,
            bearer: None,
            body: RequestBody::Json(serde_json::json!({
                "username": username,
                "password": password,
                "role": role,
            })),
        };
        let response = self.backend.execute(request).await?;
        self.check(&response, false)?;
        Ok(())
    }

    pub async fn me(&self) -> Result<UserInfo, ApiError> {
        self.get_json(self.endpoints.http("users/me")?).await
    }

    pub async fn sensors(&self, limit: usize) -> Result<Vec<SensorReading>, ApiError> {
        let mut url = self.endpoints.http("sensor-data")?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
        self.get_json(url).await
    }

    /// The bounded most-recent unresolved alerts the backend keeps for the
    /// notification strip.
    pub async fn latest_unresolved_alerts(&self) -> Result<Vec<Alert>, ApiError> {
        self.get_json(self.endpoints.http("alerts/latest-unresolved")?)
            .await
    }

    pub async fn alerts(&self, skip: usize, limit: usize) -> Result<Vec<Alert>, ApiError> {
        let mut url = self.endpoints.http("alerts/")?;
        url.query_pairs_mut()
            .append_pair("skip", &skip.to_string())
            .append_pair("limit", &limit.to_string());
        self.get_json(url).await
    }

    pub async fn resolve_alert(&self, id: i64) -> Result<Alert, ApiError> {
        let request = HttpRequest {
            method: HttpMethod::Put,
            url: self.endpoints.http(&format!("alerts/{id}/resolve"))?,
            bearer: self.store.token(),
            body: RequestBody::Empty,
        };
        let response = self.backend.execute(request).await?;
        self.check(&response, true)?;
        parse_body(&response.body)
    }

    pub async fn chat_messages(
        &self,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        let mut url = self.endpoints.http("chat/messages")?;
        url.query_pairs_mut()
            .append_pair("skip", &skip.to_string())
            .append_pair("limit", &limit.to_string());
        self.get_json(url).await
    }

    pub async fn risk_map(&self) -> Result<Vec<RiskPoint>, ApiError> {
        self.get_json(self.endpoints.http("spatial/risk-map-data")?)
            .await
    }

    pub async fn sensors_in_radius(
        &self,
        latitude: f64,
        longitude: f64,
        radius_km: f64,
        min_water_level: Option<f64>,
    ) -> Result<Vec<SensorReading>, ApiError> {
        let mut url = self.endpoints.http("spatial/sensors-in-radius")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("latitude", &latitude.to_string())
                .append_pair("longitude", &longitude.to_string())
                .append_pair("radius_km", &radius_km.to_string());
            if let Some(level) = min_water_level {
                pairs.append_pair("min_water_level", &level.to_string());
            }
        }
        self.get_json(url).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        let request = HttpRequest {
            method: HttpMethod::Get,
            url,
            bearer: self.store.token(),
            body: RequestBody::Empty,
        };
        let response = self.backend.execute(request).await?;
        self.check(&response, true)?;
        parse_body(&response.body)
    }

    /// Map a non-success status to an error. On an authenticated call a 401
    /// also destroys the session; callers observe the store emptying and
    /// route back to login.
    fn check(&self, response: &HttpResponse, authed: bool) -> Result<(), ApiError> {
        match response.status {
            200..=299 => Ok(()),
            401 if authed => {
                warn!(target: "api", "backend rejected bearer token; destroying session");
                self.store.clear();
                Err(ApiError::Unauthorized)
            }
            401 => Err(AuthError::InvalidCredentials.into()),
            422 => Err(parse_validation(&response.body)),
            status => Err(ApiError::Http {
                status,
                detail: extract_detail(&response.body),
            }),
        }
    }
}

fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|err| ApiError::InvalidResponse(err.to_string()))
}

/// FastAPI-style 422 bodies: `{"detail": [{"loc": [...], "msg": "..."}]}`.
/// The last `loc` element names the offending field.
fn parse_validation(body: &str) -> ApiError {
    #[derive(serde::Deserialize)]
    struct Item {
        #[serde(default)]
        loc: Vec<serde_json::Value>,
        msg: String,
    }
    #[derive(serde::Deserialize)]
    struct Body {
        detail: Vec<Item>,
    }

    match serde_json::from_str::<Body>(body) {
        Ok(parsed) => ApiError::Validation(
            parsed
                .detail
                .into_iter()
                .map(|item| FieldError {
                    field: item
                        .loc
                        .iter()
                        .rev()
                        .find_map(|v| v.as_str())
                        .unwrap_or("request")
                        .to_string(),
                    message: item.msg,
                })
                .collect(),
        ),
        Err(_) => ApiError::Http {
            status: 422,
            detail: extract_detail(body),
        },
    }
}

fn extract_detail(body: &str) -> String {
    #[derive(serde::Deserialize)]
    struct Body {
        detail: String,
    }
    if let Ok(parsed) = serde_json::from_str::<Body>(body) {
        return parsed.detail;
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no detail".to_string()
    } else {
        trimmed.chars().take(200).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::encode_unsigned;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use time::OffsetDateTime;

    /// Canned responses keyed by "METHOD path", recording every request.
    struct MockBackend {
        routes: HashMap<String, HttpResponse>,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl MockBackend {
        fn new() -> Self {
            Self {
                routes: HashMap::new(),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn route(mut self, key: &str, status: u16, body: &str) -> Self {
            self.routes.insert(
                key.to_string(),
                HttpResponse {
                    status,
                    body: body.to_string(),
                },
            );
            self
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpBackend for MockBackend {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
            let method = match request.method {
                HttpMethod::Get => "GET",
                HttpMethod::Post => "POST",
                HttpMethod::Put => "PUT",
            };
            let key = format!("{method} {}", request.url.path());
            self.seen.lock().unwrap().push(request);
            self.routes
                .get(&key)
                .cloned()
                .ok_or_else(|| ApiError::Http {
                    status: 404,
                    detail: format!("no mock route for {key}"),
                })
        }
    }

    fn client(backend: MockBackend) -> (ApiClient, SessionStore, Arc<MockBackend>) {
        let store = SessionStore::new();
        let backend = Arc::new(backend);
        let endpoints = Endpoints::new("http://backend.test").unwrap();
        let client = ApiClient::with_backend(endpoints, store.clone(), backend.clone());
        (client, store, backend)
    }

    fn valid_token() -> String {
        encode_unsigned(
            "asha",
            "commander",
            OffsetDateTime::now_utc().unix_timestamp() + 600,
        )
    }

    #[tokio::test]
    async fn login_installs_session_and_later_calls_carry_bearer() {
        let token = valid_token();
        let backend = MockBackend::new()
            .route(
                "POST /login",
                200,
                &format!(r#"{{"access_token":"{token}","token_type":"bearer"}}"#),
            )
            .route(
                "GET /users/me",
                200,
                r#"{"id":1,"username":"asha","role":"commander"}"#,
            )
            .route("GET /sensor-data", 200, "[]");
        let (client, store, backend) = client(backend);

        let session = client.login("asha", "secret").await.unwrap();
        assert_eq!(session.username, "asha");
        assert!(store.is_active());

        let sensors = client.sensors(50).await.unwrap();
        assert!(sensors.is_empty());

        let requests = backend.requests();
        assert_eq!(requests[0].bearer, None);
        assert_eq!(
            requests[1].bearer.as_deref(),
            Some(token.as_str()),
            "identity confirmation rides the new bearer"
        );
        assert_eq!(requests[1].url.path(), "/users/me");
        assert_eq!(
            requests[2].url.query(),
            Some("limit=50"),
            "sensor fetch must pass the limit through"
        );
    }

    #[tokio::test]
    async fn rejected_identity_check_rolls_the_session_back() {
        let token = valid_token();
        let backend = MockBackend::new()
            .route(
                "POST /login",
                200,
                &format!(r#"{{"access_token":"{token}","token_type":"bearer"}}"#),
            )
            .route(
                "GET /users/me",
                401,
                r#"{"detail":"Could not validate credentials"}"#,
            );
        let (client, store, _) = client(backend);

        let err = client.login("asha", "secret").await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
        assert!(store.current().is_none());
    }

    #[tokio::test]
    async fn alert_history_is_paginated() {
        let backend = MockBackend::new().route("GET /alerts/", 200, "[]");
        let (client, store, backend) = client(backend);
        store.set(Session::from_token(valid_token()).unwrap());

        client.alerts(20, 10).await.unwrap();
        let requests = backend.requests();
        assert_eq!(requests[0].url.query(), Some("skip=20&limit=10"));
    }

    #[tokio::test]
    async fn bad_credentials_do_not_create_a_session() {
        let backend = MockBackend::new().route(
            "POST /login",
            401,
            r#"{"detail":"Incorrect username or password"}"#,
        );
        let (client, store, _) = client(backend);

        let err = client.login("asha", "wrong").await.unwrap_err();
        assert!(matches!(err, ApiError::Auth(AuthError::InvalidCredentials)));
        assert!(store.current().is_none());
    }

    #[tokio::test]
    async fn unauthorized_response_destroys_the_session() {
        let backend = MockBackend::new().route(
            "GET /alerts/latest-unresolved",
            401,
            r#"{"detail":"Could not validate credentials"}"#,
        );
        let (client, store, _) = client(backend);
        store.set(Session::from_token(valid_token()).unwrap());

        let err = client.latest_unresolved_alerts().await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
        assert!(store.current().is_none(), "401 must clear the session");
    }

    #[tokio::test]
    async fn registration_surfaces_field_errors() {
        let backend = MockBackend::new().route(
            "POST /register",
            422,
            r#"{"detail":[{"loc":["body","username"],"msg":"field required","type":"value_error"}]}"#,
        );
        let (client, _, _) = client(backend);

        let err = client.register("", "pw", Role::Viewer).await.unwrap_err();
        match err {
            ApiError::Validation(fields) => {
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].field, "username");
                assert_eq!(fields[0].message, "field required");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn radius_query_builds_spatial_parameters() {
        let backend = MockBackend::new().route("GET /spatial/sensors-in-radius", 200, "[]");
        let (client, store, backend) = client(backend);
        store.set(Session::from_token(valid_token()).unwrap());

        client
            .sensors_in_radius(13.08, 80.27, 25.0, Some(4.5))
            .await
            .unwrap();

        let requests = backend.requests();
        let query = requests[0].url.query().unwrap();
        assert!(query.contains("latitude=13.08"));
        assert!(query.contains("longitude=80.27"));
        assert!(query.contains("radius_km=25"));
        assert!(query.contains("min_water_level=4.5"));
    }

    #[tokio::test]
    async fn plain_http_failures_carry_status_and_detail() {
        let backend =
            MockBackend::new().route("GET /spatial/risk-map-data", 500, r#"{"detail":"db down"}"#);
        let (client, store, _) = client(backend);
        store.set(Session::from_token(valid_token()).unwrap());

        let err = client.risk_map().await.unwrap_err();
        match err {
            ApiError::Http { status, detail } => {
                assert_eq!(status, 500);
                assert_eq!(detail, "db down");
            }
            other => panic!("expected http error, got {other:?}"),
        }
        assert!(store.current().is_some(), "non-401 errors keep the session");
    }
}
