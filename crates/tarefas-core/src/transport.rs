use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::{Error, Result};
use crate::notify::{SessionEvent, SharedNotifier};
use crate::token::TokenStore;

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Json(Value),
    Form(Vec<(String, String)>),
}

impl Body {
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    fn encode(&self) -> Result<(&'static str, Vec<u8>)> {
        match self {
            Self::Json(value) => Ok((JSON_CONTENT_TYPE, serde_json::to_vec(value)?)),
            Self::Form(pairs) => {
                let encoded = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                    .finish();
                Ok((FORM_CONTENT_TYPE, encoded.into_bytes()))
            }
        }
    }
}

/// A request as it leaves the client, after authorization and encoding.
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub method: Method,
    pub path: String,
    pub bearer: Option<String>,
    pub content_type: Option<&'static str>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct WireResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl WireResponse {
    pub fn json(status: u16, value: &Value) -> Self {
        Self {
            status,
            content_type: Some(JSON_CONTENT_TYPE.to_string()),
            body: serde_json::to_vec(value).unwrap_or_default(),
        }
    }

    pub fn empty(status: u16) -> Self {
        Self {
            status,
            content_type: None,
            body: Vec::new(),
        }
    }
}

/// The request never produced a response: host unreachable, refused,
/// timed out, or the body could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireFailure(pub String);

/// Moves bytes to the remote API and back.
#[async_trait]
pub trait Wire: Send + Sync {
    async fn send(&self, request: WireRequest) -> std::result::Result<WireResponse, WireFailure>;
}

/// Calls the task API: attaches the bearer token, encodes bodies, and
/// classifies every outcome into [`Error`].
#[derive(Clone)]
pub struct ApiClient {
    wire: Arc<dyn Wire>,
    tokens: Arc<dyn TokenStore>,
    notifier: SharedNotifier,
}

impl ApiClient {
    pub fn new(wire: Arc<dyn Wire>, tokens: Arc<dyn TokenStore>, notifier: SharedNotifier) -> Self {
        Self {
            wire,
            tokens,
            notifier,
        }
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    pub fn notifier(&self) -> &SharedNotifier {
        &self.notifier
    }

    #[instrument(skip(self, body), fields(method = %method, endpoint = %endpoint))]
    pub async fn call(
        &self,
        endpoint: &str,
        method: Method,
        body: Option<Body>,
        is_public: bool,
    ) -> Result<Value> {
        let bearer = if is_public {
            None
        } else {
            Some(self.tokens.load().ok_or(Error::Unauthenticated)?)
        };

        let (content_type, bytes) = match body {
            Some(_) if method == Method::Get => {
                debug!("dropping body on GET request");
                (None, Vec::new())
            }
            Some(body) => {
                let (content_type, bytes) = body.encode()?;
                (Some(content_type), bytes)
            }
            None => (None, Vec::new()),
        };

        let request = WireRequest {
            method,
            path: endpoint.to_string(),
            bearer,
            content_type,
            body: bytes,
        };

        let response = match self.wire.send(request).await {
            Ok(response) => response,
            Err(WireFailure(reason)) => {
                warn!(reason = %reason, "request did not reach the server");
                return Err(Error::Connection(reason));
            }
        };

        debug!(status = response.status, bytes = response.body.len(), "response received");

        if !(200..300).contains(&response.status) {
            let raw_body = String::from_utf8_lossy(&response.body).to_string();
            let message = error_message(response.status, &raw_body);
            if response.status == 401 && !is_public {
                warn!("session rejected by server; discarding token");
                self.tokens.clear();
                self.notifier.session(SessionEvent::Expired);
            }
            return Err(Error::Api {
                status: response.status,
                message,
                raw_body,
            });
        }

        decode_payload(&response)
    }

    pub async fn call_as<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        method: Method,
        body: Option<Body>,
        is_public: bool,
    ) -> Result<T> {
        let payload = self.call(endpoint, method, body, is_public).await?;
        Ok(serde_json::from_value(payload)?)
    }
}

fn decode_payload(response: &WireResponse) -> Result<Value> {
    let is_json = response
        .content_type
        .as_deref()
        .map(|ct| ct.to_ascii_lowercase().contains("json"))
        .unwrap_or(false);

    if !is_json || response.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }

    Ok(serde_json::from_slice(&response.body)?)
}

/// Pulls a human readable message out of an error body. FastAPI puts it
/// under `detail`; other servers use `message`.
fn error_message(status: u16, raw_body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(raw_body) {
        for key in ["detail", "message", "error"] {
            match map.get(key) {
                Some(Value::String(text)) => return text.clone(),
                Some(Value::Null) | None => {}
                Some(other) => return other.to_string(),
            }
        }
    }

    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {status}"))
}
