use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::StatusCode;
use tracing::debug;

/// How a request can fail from the caller's point of view. Validation
/// failures never reach the network; everything the server refuses becomes
/// `Request` with whatever human-readable message the body carried.
#[derive(Debug, Clone)]
pub enum ApiError {
    Validation(String),
    Request { status: u16, message: String },
    Transport(String),
}

impl ApiError {
    pub fn message(&self) -> &str {
        match self {
            ApiError::Validation(message) => message,
            ApiError::Request { message, .. } => message,
            ApiError::Transport(message) => message,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Validation(message) => write!(f, "{message}"),
            ApiError::Request { status, message } => write!(f, "{message} (HTTP {status})"),
            ApiError::Transport(message) => write!(f, "request failed: {message}"),
        }
    }
}

/// Conventional `{ success, message, data }` envelope the backend wraps
/// every JSON response in.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiEnvelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Thin HTTP wrapper: base URL joining plus bearer-token injection. The
/// token slot is shared with the session store so login/logout take effect
/// on the next request. Methods block and are meant to be called from
/// worker threads, never from the UI thread.
pub struct ApiClient {
    base_url: String,
    token: Mutex<Option<String>>,
    http: reqwest::Client,
    runtime: tokio::runtime::Runtime,
}

pub type SharedApiClient = Arc<ApiClient>;

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, String> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|err| format!("failed to initialize http runtime: {err}"))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|err| format!("failed to initialize http client: {err}"))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: Mutex::new(None),
            http,
            runtime,
        })
    }

    pub fn set_token(&self, token: Option<String>) {
        let mut slot = self.token.lock().expect("api token lock poisoned");
        *slot = token;
    }

    fn bearer(&self) -> Option<String> {
        self.token.lock().expect("api token lock poisoned").clone()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn get_json(&self, path: &str) -> Result<ApiEnvelope, ApiError> {
        let request = self.http.get(self.url(path));
        self.send_json(request)
    }

    pub fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<ApiEnvelope, ApiError> {
        let request = self.http.post(self.url(path)).json(body);
        self.send_json(request)
    }

    pub fn patch_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<ApiEnvelope, ApiError> {
        let request = self.http.patch(self.url(path)).json(body);
        self.send_json(request)
    }

    /// Multipart upload returning raw bytes (used by the certificate
    /// endpoints, which answer with the rendered image).
    pub fn post_multipart_bytes(
        &self,
        path: &str,
        text_parts: Vec<(&'static str, String)>,
        file_part: Option<FilePart>,
    ) -> Result<Vec<u8>, ApiError> {
        let url = self.url(path);
        let bearer = self.bearer();
        self.runtime.block_on(async {
            let mut form = reqwest::multipart::Form::new();
            for (name, value) in text_parts {
                form = form.text(name, value);
            }
            if let Some(file) = file_part {
                let part = reqwest::multipart::Part::bytes(file.bytes)
                    .file_name(file.file_name)
                    .mime_str(&file.mime)
                    .map_err(|err| ApiError::Transport(err.to_string()))?;
                form = form.part(file.part_name, part);
            }

            let mut request = self.http.post(&url).multipart(form);
            if let Some(token) = bearer {
                request = request.bearer_auth(token);
            }

            let response = request
                .send()
                .await
                .map_err(|err| ApiError::Transport(err.to_string()))?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ApiError::Request {
                    status: status.as_u16(),
                    message: extract_error_message(status, &body),
                });
            }
            response
                .bytes()
                .await
                .map(|bytes| bytes.to_vec())
                .map_err(|err| ApiError::Transport(err.to_string()))
        })
    }

    fn send_json(&self, request: reqwest::RequestBuilder) -> Result<ApiEnvelope, ApiError> {
        let bearer = self.bearer();
        self.runtime.block_on(async {
            let mut request = request;
            if let Some(token) = bearer {
                request = request.bearer_auth(token);
            }

            let response = request
                .send()
                .await
                .map_err(|err| ApiError::Transport(err.to_string()))?;
            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|err| ApiError::Transport(err.to_string()))?;

            if !status.is_success() {
                debug!("Request failed with {}: {}", status, body);
                return Err(ApiError::Request {
                    status: status.as_u16(),
                    message: extract_error_message(status, &body),
                });
            }

            serde_json::from_str::<ApiEnvelope>(&body)
                .map_err(|err| ApiError::Transport(format!("invalid response body: {err}")))
        })
    }
}

/// Non-2xx bodies conventionally carry a `message` field; fall back to the
/// status line when they don't.
fn extract_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body)
        && let Some(message) = value.get("message").and_then(|m| m.as_str())
        && !message.trim().is_empty()
    {
        return message.trim().to_string();
    }
    match status.canonical_reason() {
        Some(reason) => format!("{} ({})", reason, status.as_u16()),
        None => format!("HTTP {}", status.as_u16()),
    }
}

/// Decode the typed payload out of an envelope, treating a missing `data`
/// or `success: false` as a request-level failure.
pub fn decode_data<T: serde::de::DeserializeOwned>(
    envelope: ApiEnvelope,
    what: &str,
) -> Result<T, ApiError> {
    if !envelope.success {
        return Err(ApiError::Request {
            status: 200,
            message: envelope
                .message
                .unwrap_or_else(|| format!("Failed to load {what}")),
        });
    }
    let data = envelope.data.ok_or_else(|| ApiError::Transport(format!(
        "missing data for {what}"
    )))?;
    serde_json::from_value(data)
        .map_err(|err| ApiError::Transport(format!("invalid {what} payload: {err}")))
}

pub struct FilePart {
    pub part_name: &'static str,
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_body_message_field() {
        let message = extract_error_message(
            StatusCode::CONFLICT,
            r#"{"success": false, "message": "You already have a team for this event"}"#,
        );
        assert_eq!(message, "You already have a team for this event");
    }

    #[test]
    fn error_message_falls_back_to_status_reason() {
        let message = extract_error_message(StatusCode::BAD_GATEWAY, "<html>oops</html>");
        assert_eq!(message, "Bad Gateway (502)");

        let message = extract_error_message(StatusCode::UNAUTHORIZED, r#"{"message": "  "}"#);
        assert_eq!(message, "Unauthorized (401)");
    }

    #[test]
    fn decode_data_surfaces_unsuccessful_envelope_message() {
        let envelope = ApiEnvelope {
            success: false,
            message: Some("Registration is closed".into()),
            data: None,
        };
        let result: Result<serde_json::Value, ApiError> = decode_data(envelope, "team details");
        match result {
            Err(ApiError::Request { message, .. }) => {
                assert_eq!(message, "Registration is closed");
            }
            other => panic!("expected request error, got {other:?}"),
        }
    }
}
