//! Request executor / 请求执行器
//!
//! Runs one `RequestSpec` to exactly one terminal `SubRequestEvent`:
//! staggered start, POST with per-attempt timeout, retry on timeout only,
//! then classification of the reply.
//! 每个子请求恰好产生一个终止事件。

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::query::RequestSpec;
use super::retry::{RetryFailure, RetryPolicy};
use crate::bazaar::{ApiReply, QueryResp, Transport};
use crate::error::TransportError;
use crate::models::SampleRecord;

/// Executor settings / 执行器设置
#[derive(Debug, Clone, Copy)]
pub struct ExecutorSettings {
    /// Timeout of a single attempt / 单次尝试超时
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        let timeout = Duration::from_secs(30);
        Self {
            timeout,
            retry: RetryPolicy::on_timeout(3, timeout),
        }
    }
}

/// Terminal event of one sub-request / 子请求终止事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubRequestEvent {
    /// `query_status == "ok"` / 查询成功
    Success(Vec<SampleRecord>),
    /// Well-formed reply with a non-ok status, carries the raw status / 非ok状态
    Empty(String),
    /// Fatal for the whole batch / 致命错误
    Failure(TransportError),
    /// Aborted at a suspension point / 在挂起点被取消
    Cancelled,
}

/// Request executor / 请求执行器
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    settings: ExecutorSettings,
}

impl RequestExecutor {
    pub fn new(transport: Arc<dyn Transport>, settings: ExecutorSettings) -> Self {
        Self { transport, settings }
    }

    /// Execute one sub-request / 执行一个子请求
    pub async fn execute(
        &self,
        spec: &RequestSpec,
        start_delay: Duration,
        cancel: &CancellationToken,
    ) -> SubRequestEvent {
        if !start_delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("{} cancelled before start", spec.label());
                    return SubRequestEvent::Cancelled;
                }
                _ = tokio::time::sleep(start_delay) => {}
            }
        }

        tracing::debug!("{} started after {:?}", spec.label(), start_delay);

        let form = spec.to_form();
        let timeout = self.settings.timeout;
        let transport = &self.transport;

        let reply = self
            .settings
            .retry
            .run(cancel, |attempt| {
                let form = &form;
                async move {
                    match tokio::time::timeout(timeout, transport.post_form(form)).await {
                        Ok(result) => result,
                        Err(_) => Err(TransportError::Timeout { attempts: attempt }),
                    }
                }
            })
            .await;

        let event = match reply {
            Ok(reply) => classify(reply),
            Err(RetryFailure::Cancelled) => SubRequestEvent::Cancelled,
            Err(RetryFailure::Failed { error: TransportError::Timeout { .. }, attempts }) => {
                SubRequestEvent::Failure(TransportError::Timeout { attempts })
            }
            Err(RetryFailure::Failed { error, .. }) => SubRequestEvent::Failure(error),
        };

        match &event {
            SubRequestEvent::Success(records) => {
                tracing::info!("{} returned {} sample(s)", spec.label(), records.len())
            }
            SubRequestEvent::Empty(status) => tracing::info!("{} returned status {}", spec.label(), status),
            SubRequestEvent::Failure(error) => tracing::warn!("{} failed: {}", spec.label(), error),
            SubRequestEvent::Cancelled => tracing::debug!("{} cancelled", spec.label()),
        }

        event
    }
}

/// Classify a buffered reply / 归类响应
fn classify(reply: ApiReply) -> SubRequestEvent {
    if !reply.is_success() {
        return SubRequestEvent::Failure(TransportError::Http(reply.status));
    }

    let resp: QueryResp = match serde_json::from_slice(&reply.body) {
        Ok(resp) => resp,
        Err(e) => return SubRequestEvent::Failure(TransportError::Decode(e.to_string())),
    };

    if !resp.is_ok() {
        return SubRequestEvent::Empty(resp.query_status);
    }

    SubRequestEvent::Success(resp.data.into_iter().map(SampleRecord::from).collect())
}
