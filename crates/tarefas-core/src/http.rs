use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::transport::{Method, Wire, WireFailure, WireRequest, WireResponse};

/// [`Wire`] backed by a real HTTP connection.
#[derive(Debug, Clone)]
pub struct HttpWire {
    client: reqwest::Client,
    base_url: String,
}

impl HttpWire {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| Error::Connection(format!("failed building HTTP client: {err}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

fn to_reqwest(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait]
impl Wire for HttpWire {
    async fn send(&self, request: WireRequest) -> std::result::Result<WireResponse, WireFailure> {
        let url = self.url_for(&request.path);
        debug!(method = %request.method, url = %url, "sending request");

        let mut builder = self
            .client
            .request(to_reqwest(request.method), url.as_str())
            .header(reqwest::header::ACCEPT, "application/json");

        if let Some(token) = request.bearer.as_deref() {
            builder = builder.header(reqwest::header::AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(content_type) = request.content_type {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .body(request.body);
        }

        let response = builder.send().await.map_err(|err| {
            warn!(url = %url, error = %err, "request failed before a response arrived");
            WireFailure(err.to_string())
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let body = response.bytes().await.map_err(|err| {
            warn!(url = %url, error = %err, "failed reading response body");
            WireFailure(err.to_string())
        })?;

        Ok(WireResponse {
            status,
            content_type,
            body: body.to_vec(),
        })
    }
}
