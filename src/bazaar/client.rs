//! MalwareBazaar HTTP client / MalwareBazaar HTTP客户端

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use std::time::Duration;

use super::{ApiReply, Form, StreamReply, Transport};
use crate::error::TransportError;

/// Header carrying the static credential / 携带静态凭证的请求头
pub const API_KEY_HEADER: &str = "API-KEY";

/// MalwareBazaar HTTP client / MalwareBazaar HTTP客户端
///
/// Search requests get the per-request timeout; download streams only get the
/// connect timeout so large samples are not cut off.
pub struct BazaarClient {
    client: Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
}

impl BazaarClient {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .user_agent(concat!("bazaar-search/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            timeout,
        })
    }

    fn request(&self, form: &Form) -> reqwest::RequestBuilder {
        self.client
            .post(&self.endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .form(form)
    }
}

/// Classify a reqwest error / 归类reqwest错误
fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout { attempts: 1 }
    } else if let Some(status) = err.status() {
        TransportError::Http(status.as_u16())
    } else {
        TransportError::Connection(err.to_string())
    }
}

#[async_trait]
impl Transport for BazaarClient {
    async fn post_form(&self, form: &Form) -> Result<ApiReply, TransportError> {
        let resp = self
            .request(form)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(classify)?;

        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(classify)?;
        tracing::debug!("POST {} -> {} ({} bytes)", self.endpoint, status, body.len());

        Ok(ApiReply { status, body })
    }

    async fn post_form_stream(&self, form: &Form) -> Result<StreamReply, TransportError> {
        let resp = self.request(form).send().await.map_err(classify)?;

        let status = resp.status().as_u16();
        let content_length = resp.content_length();
        tracing::debug!("POST {} -> {} (stream, length {:?})", self.endpoint, status, content_length);

        Ok(StreamReply {
            status,
            content_length,
            body: resp.bytes_stream().map(|chunk| chunk.map_err(classify)).boxed(),
        })
    }
}
