//! YoLink cloud API client.
//!
//! Hides the OAuth2 token lifecycle and the upstream request/response shape
//! behind two read operations: list eligible sensors and fetch one sensor's
//! current state. Every authenticated call checks session validity first, so
//! callers never have to sequence token refresh themselves.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

/// Device type eligible for export
const SENSOR_TYPE: &str = "THSensor";

/// Device model eligible for export
const SENSOR_MODEL: &str = "YS8007-UC";

/// Application-level success code returned by the YoLink API
const SUCCESS_CODE: &str = "000000";

/// Safety margin subtracted from the upstream-declared token lifetime
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Per-request HTTP timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = "yolink-exporter/1.0";

/// Client errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("token request failed with status {status}: {body}")]
    Auth { status: u16, body: String },

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("API returned error code {0}")]
    Code(String),

    #[error("malformed response body: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Identity and metadata for one physical sensor. Immutable once fetched;
/// replaced wholesale on each device-list refresh.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Device {
    pub device_id: String,
    #[serde(rename = "deviceUDID")]
    pub device_udid: String,
    pub name: String,
    /// Per-device token required for state queries
    pub token: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub parent_device_id: Option<String>,
    pub model_name: String,
    pub service_zone: String,
}

/// Most recent observed telemetry for one device.
#[derive(Debug, Clone)]
pub struct DeviceState {
    pub online: bool,
    pub temperature: f64,
    pub humidity: f64,
    pub battery: i64,
    /// When the device recorded the reading (RFC 3339), not when it was fetched
    pub report_at: String,
}

/// Read operations the exporter needs. Implemented by [`YoLinkClient`] and by
/// fake clients in tests.
pub trait DeviceApi: Send {
    /// List all devices matching the export filter.
    fn list_devices(&mut self) -> Result<Vec<Device>, ClientError>;

    /// Fetch the current state of one device.
    fn device_state(&mut self, device: &Device) -> Result<DeviceState, ClientError>;
}

/// Export filter: only the THSensor hygrometer model is scraped.
pub fn is_exported_sensor(device: &Device) -> bool {
    device.device_type == SENSOR_TYPE && device.model_name == SENSOR_MODEL
}

/// OAuth2 session held by the client.
#[derive(Debug, Clone)]
struct AuthSession {
    access_token: String,
    refresh_token: String,
    expires_at: Instant,
}

impl AuthSession {
    /// A session must expire strictly in the future to be usable.
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    expires_in: u64,
}

/// RPC-style request body accepted by the single API endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiRequest<'a> {
    method: &'a str,
    time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_device: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
struct DeviceListData {
    #[serde(default)]
    devices: Vec<Device>,
}

#[derive(Debug, Deserialize)]
struct DeviceListResponse {
    code: String,
    #[serde(default)]
    data: DeviceListData,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct SensorReading {
    battery: i64,
    humidity: f64,
    temperature: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StateData {
    online: bool,
    state: SensorReading,
    report_at: String,
}

#[derive(Debug, Deserialize)]
struct DeviceStateResponse {
    code: String,
    #[serde(default)]
    data: StateData,
}

fn ensure_success(code: String) -> Result<(), ClientError> {
    if code != SUCCESS_CODE {
        return Err(ClientError::Code(code));
    }
    Ok(())
}

/// Stateful wrapper around the YoLink API.
///
/// The session is mutated only from within the exporter's exclusive lock;
/// there is exactly one collector per process, so the client carries no
/// locking of its own.
pub struct YoLinkClient {
    api_key: String,
    secret: String,
    endpoint: String,
    session: Option<AuthSession>,
    http: reqwest::blocking::Client,
}

impl YoLinkClient {
    pub fn new(
        api_key: impl Into<String>,
        secret: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Result<Self, ClientError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            api_key: api_key.into(),
            secret: secret.into(),
            endpoint: endpoint.into(),
            session: None,
            http,
        })
    }

    /// A never-acquired session counts as expired.
    fn session_expired(&self, now: Instant) -> bool {
        self.session.as_ref().map_or(true, |s| s.is_expired(now))
    }

    /// Precondition for every authenticated call: hold a session that is
    /// valid, or acquire one, or fail. Prefers the refresh grant when a
    /// refresh token is held; failures propagate without internal retry.
    fn ensure_valid_session(&mut self) -> Result<(), ClientError> {
        let now = Instant::now();
        if !self.session_expired(now) {
            return Ok(());
        }

        let refresh_token = self
            .session
            .as_ref()
            .map(|s| s.refresh_token.clone())
            .filter(|t| !t.is_empty());

        let token = match refresh_token {
            Some(refresh_token) => {
                debug!("refreshing access token");
                self.request_token(&[
                    ("grant_type", "refresh_token"),
                    ("client_id", self.api_key.as_str()),
                    ("refresh_token", refresh_token.as_str()),
                ])?
            }
            None => {
                debug!("acquiring initial access token");
                self.request_token(&[
                    ("grant_type", "client_credentials"),
                    ("client_id", self.api_key.as_str()),
                    ("client_secret", self.secret.as_str()),
                ])?
            }
        };

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        self.session = Some(AuthSession {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: now + lifetime,
        });
        Ok(())
    }

    fn request_token(&self, params: &[(&str, &str)]) -> Result<TokenResponse, ClientError> {
        let url = format!("{}/open/yolink/token", self.endpoint);
        let response = self.http.post(url).form(params).send()?;
        let status = response.status();
        let body = response.text()?;

        if !status.is_success() {
            return Err(ClientError::Auth {
                status: status.as_u16(),
                body,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// POST to the RPC endpoint with the session bearer token. Callers run
    /// `ensure_valid_session` first.
    fn post_api(&self, request: &ApiRequest<'_>) -> Result<String, ClientError> {
        let bearer = self
            .session
            .as_ref()
            .map(|s| s.access_token.as_str())
            .unwrap_or_default();
        let url = format!("{}/open/yolink/v2/api", self.endpoint);
        let response = self.http.post(url).bearer_auth(bearer).json(request).send()?;
        let status = response.status();
        let body = response.text()?;

        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

impl DeviceApi for YoLinkClient {
    fn list_devices(&mut self) -> Result<Vec<Device>, ClientError> {
        self.ensure_valid_session()?;

        let request = ApiRequest {
            method: "Home.getDeviceList",
            time: chrono::Utc::now().timestamp(),
            target_device: None,
            token: None,
        };
        let body = self.post_api(&request)?;
        let parsed: DeviceListResponse = serde_json::from_str(&body)?;
        ensure_success(parsed.code)?;

        Ok(parsed
            .data
            .devices
            .into_iter()
            .filter(is_exported_sensor)
            .collect())
    }

    fn device_state(&mut self, device: &Device) -> Result<DeviceState, ClientError> {
        self.ensure_valid_session()?;

        let request = ApiRequest {
            method: "THSensor.getState",
            time: chrono::Utc::now().timestamp(),
            target_device: Some(&device.device_id),
            token: Some(&device.token),
        };
        let body = self.post_api(&request)?;
        let parsed: DeviceStateResponse = serde_json::from_str(&body)?;
        ensure_success(parsed.code)?;

        let data = parsed.data;
        Ok(DeviceState {
            online: data.online,
            temperature: data.state.temperature,
            humidity: data.state.humidity,
            battery: data.state.battery,
            report_at: data.report_at,
        })
    }
}
