use crate::{
    config::ApiConfig,
    error::{BotError, Result},
    guard::EndpointGuard,
    models::{Credential, GameTask, Profile, Reward, SessionToken},
};
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, ORIGIN, REFERER, USER_AGENT};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub mod endpoints {
    pub const AUTH: &str = "/auth/validate";
    pub const PROFILE: &str = "/user/profile";
    pub const STREAK_CLAIM: &str = "/user/streak/claim";
    pub const SPIN: &str = "/spinner/spin";
    pub const COMBO_ITEMS: &str = "/combo/items";
    pub const COMBO_CHECK: &str = "/combo/check";
    pub const SQUAD_DONATE: &str = "/squad/donate";
    pub const TASKS: &str = "/tasks/user";
    pub const STAKE: &str = "/token_pool/";

    pub fn upgrade(component: &str) -> String {
        format!("/user/boost/{}/next_level", component)
    }

    pub fn join_squad(squad_id: u64) -> String {
        format!("/user/join_squad/{}", squad_id)
    }

    pub fn verify_task(task_id: &str) -> String {
        format!("/tasks/check_tg_task/{}", task_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub bearer: Option<SessionToken>,
    pub body: Option<Value>,
}

impl ApiRequest {
    /// Method plus path, without host or query string.
    pub fn endpoint_key(&self) -> String {
        let path = self.path.split('?').next().unwrap_or_default();
        format!("{} {}", self.method, path)
    }
}

/// Status and undecoded body of one HTTP exchange.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Sends requests to the game API.
///
/// Implementations only fail on transport problems; any HTTP status is a
/// successful [`RawResponse`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse>;
}

/// Opens a fresh HTTP session for each account.
pub trait Connector: Send + Sync {
    fn connect(&self) -> Result<Arc<dyn Transport>>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(api: &ApiConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("id-ID,id;q=0.9,en-US;q=0.8,en;q=0.7"),
        );
        headers.insert(ORIGIN, header_value(&api.origin)?);
        headers.insert(REFERER, header_value(&api.referer)?);
        headers.insert(USER_AGENT, header_value(&api.user_agent)?);
        headers.insert("sec-fetch-dest", HeaderValue::from_static("empty"));
        headers.insert("sec-fetch-mode", HeaderValue::from_static("cors"));
        headers.insert("sec-fetch-site", HeaderValue::from_static("same-site"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(api.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: api.base_url.trim_end_matches('/').to_string(),
        })
    }
}

fn header_value(raw: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(raw).map_err(|e| BotError::Config(format!("Invalid header value '{}': {}", raw, e)))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };

        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();

        Ok(RawResponse { status, body })
    }
}

pub struct HttpConnector {
    api: ApiConfig,
}

impl HttpConnector {
    pub fn new(api: ApiConfig) -> Self {
        Self { api }
    }
}

impl Connector for HttpConnector {
    fn connect(&self) -> Result<Arc<dyn Transport>> {
        Ok(Arc::new(HttpTransport::new(&self.api)?))
    }
}

/// A response that already passed the drift guard.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub endpoint: String,
    pub status: u16,
    pub body: Vec<u8>,
    json: Option<Value>,
}

impl ApiResponse {
    fn new(endpoint: String, raw: RawResponse) -> Self {
        let json = serde_json::from_slice(&raw.body).ok();
        Self {
            endpoint,
            status: raw.status,
            body: raw.body,
            json,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn data(&self) -> Option<&Value> {
        self.json.as_ref().and_then(|v| v.get("data"))
    }

    pub fn message(&self) -> Option<&str> {
        self.json
            .as_ref()
            .and_then(|v| v.get("message"))
            .and_then(Value::as_str)
    }

    pub fn message_or(&self, fallback: &str) -> String {
        self.message().unwrap_or(fallback).to_string()
    }

    /// Non-2xx statuses become [`BotError::Api`].
    pub fn into_success(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(BotError::Api {
                message: self.message_or("Unknown error"),
                endpoint: self.endpoint,
                status: self.status,
            })
        }
    }

    pub fn require_data(&self) -> Result<&Value> {
        self.data()
            .ok_or_else(|| BotError::malformed(&self.endpoint, "missing 'data' field"))
    }
}

/// Game API calls for one account, every response checked by the guard.
pub struct GameClient {
    transport: Arc<dyn Transport>,
    guard: Arc<EndpointGuard>,
    token: Option<SessionToken>,
}

impl GameClient {
    pub fn new(transport: Arc<dyn Transport>, guard: Arc<EndpointGuard>) -> Self {
        Self {
            transport,
            guard,
            token: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn build(&self, method: Method, path: &str, body: Option<Value>) -> ApiRequest {
        ApiRequest {
            method,
            path: path.to_string(),
            bearer: self.token.clone(),
            body,
        }
    }

    fn observe(&self, request: &ApiRequest, raw: RawResponse) -> Result<ApiResponse> {
        let endpoint = request.endpoint_key();
        debug!("{} -> {} ({} bytes)", endpoint, raw.status, raw.body.len());

        if !self.guard.check(&endpoint, raw.status, &raw.body) {
            return Err(BotError::EndpointDrift { endpoint });
        }
        Ok(ApiResponse::new(endpoint, raw))
    }

    /// Send one request and pass its response through the drift guard.
    pub async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Result<ApiResponse> {
        let request = self.build(method, path, body);
        let raw = self.transport.send(&request).await?;
        self.observe(&request, raw)
    }

    /// Exchange the credential for a bearer token.
    ///
    /// Transport errors are retried for up to `retry_secs`; an HTTP response
    /// of any kind ends the exchange. Returns `Ok(None)` when the response
    /// carries no token.
    pub async fn authenticate(&mut self, credential: &Credential, retry_secs: u64) -> Result<Option<SessionToken>> {
        let request = ApiRequest {
            method: Method::Post,
            path: endpoints::AUTH.to_string(),
            bearer: None,
            body: Some(json!({ "hash": credential.as_str() })),
        };

        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(retry_secs)),
            initial_interval: Duration::from_millis(500),
            ..Default::default()
        };

        let transport = Arc::clone(&self.transport);
        let raw = retry(backoff, || {
            let transport = Arc::clone(&transport);
            let request = request.clone();
            async move { transport.send(&request).await.map_err(backoff::Error::transient) }
        })
        .await?;

        let response = self.observe(&request, raw)?.into_success()?;
        let token = response.data().and_then(extract_token).map(SessionToken::new);
        self.token = token.clone();
        Ok(token)
    }

    pub async fn profile(&self) -> Result<Profile> {
        let response = self
            .request(Method::Get, endpoints::PROFILE, None)
            .await?
            .into_success()?;
        Ok(Profile::from_data(response.require_data()?))
    }

    pub async fn claim_streak(&self) -> Result<ApiResponse> {
        self.request(Method::Post, endpoints::STREAK_CLAIM, None).await
    }

    pub async fn spin_count(&self) -> Result<u64> {
        let response = self
            .request(Method::Get, endpoints::SPIN, None)
            .await?
            .into_success()?;
        Ok(response
            .require_data()?
            .get("spin_count")
            .and_then(crate::utils::value_as_u64)
            .unwrap_or(0))
    }

    pub async fn spin(&self, count: u64) -> Result<Vec<Reward>> {
        let response = self
            .request(Method::Post, endpoints::SPIN, Some(json!({ "spin_count": count })))
            .await?
            .into_success()?;

        match response.data() {
            Some(Value::Array(items)) => Ok(items
                .iter()
                .filter_map(|item| match serde_json::from_value(item.clone()) {
                    Ok(reward) => Some(reward),
                    Err(e) => {
                        warn!("[Spin] Unreadable reward {}: {}", item, e);
                        None
                    }
                })
                .collect()),
            _ => Ok(Vec::new()),
        }
    }

    pub async fn combo_items(&self) -> Result<Vec<Value>> {
        let response = self
            .request(Method::Get, endpoints::COMBO_ITEMS, None)
            .await?
            .into_success()?;

        let items = match response.require_data()? {
            Value::Array(items) => items,
            _ => return Err(BotError::malformed(&response.endpoint, "combo items are not a list")),
        };

        Ok(items
            .iter()
            .filter_map(|item| match item {
                Value::Object(map) => map.get("id").cloned(),
                Value::Null => None,
                other => Some(other.clone()),
            })
            .collect())
    }

    pub async fn check_combo(&self, combo: &[Value]) -> Result<ApiResponse> {
        self.request(Method::Post, endpoints::COMBO_CHECK, Some(json!({ "combo": combo })))
            .await
    }

    pub async fn upgrade(&self, component: &str) -> Result<ApiResponse> {
        self.request(Method::Post, &endpoints::upgrade(component), None).await
    }

    pub async fn join_squad(&self, squad_id: u64) -> Result<ApiResponse> {
        self.request(Method::Post, &endpoints::join_squad(squad_id), None).await
    }

    pub async fn donate(&self, amount: f64) -> Result<ApiResponse> {
        self.request(Method::Post, endpoints::SQUAD_DONATE, Some(json!({ "amount": amount })))
            .await
    }

    pub async fn tasks(&self) -> Result<Vec<GameTask>> {
        let response = self
            .request(Method::Get, endpoints::TASKS, None)
            .await?
            .into_success()?;

        match response.data() {
            Some(Value::Array(items)) => Ok(items
                .iter()
                .filter_map(|item| match serde_json::from_value(item.clone()) {
                    Ok(task) => Some(task),
                    Err(e) => {
                        warn!("[Task] Unreadable task {}: {}", item, e);
                        None
                    }
                })
                .collect()),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(_) => Err(BotError::malformed(&response.endpoint, "tasks are not a list")),
        }
    }

    pub async fn verify_task(&self, task_id: &str) -> Result<ApiResponse> {
        self.request(Method::Post, &endpoints::verify_task(task_id), None).await
    }

    pub async fn stake(&self, amount: f64) -> Result<ApiResponse> {
        self.request(Method::Post, endpoints::STAKE, Some(json!({ "amount": amount })))
            .await
    }
}

/// The token sits at `data.token` or, on some accounts, `data.user.token`.
pub fn extract_token(data: &Value) -> Option<String> {
    let direct = data.get("token").and_then(Value::as_str);
    let nested = || {
        data.get("user")
            .and_then(|user| user.get("token"))
            .and_then(Value::as_str)
    };

    direct
        .or_else(nested)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}
