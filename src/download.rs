//! Sample download module / 样本下载模块
//!
//! This module handles:
//! - Hash validation before any request / 请求前校验哈希
//! - A single, non-retried `get_file` request / 单次不重试的下载请求
//! - Streaming the archive to `<dir>/<sha256>.zip` / 流式写入本地文件
//! - Coarse 0-100 progress notifications / 粗粒度的进度通知
//!
//! Note: archive extraction is not done here.
//! 注意: 这里不负责解压。

use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::bazaar::{QueryResp, Transport};
use crate::error::{SearchError, TransportError};
use crate::utils::is_sha256;

/// Progress callback, receives a percentage / 进度回调，参数为百分比
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;

/// Largest body still inspected as a JSON status reply / 作为JSON状态响应检查的最大长度
const STATUS_PEEK_LIMIT: usize = 64 * 1024;

/// Download request / 下载请求
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub sha256_hash: String,
    /// Shown in the not-found message / 用于未找到时的提示
    pub file_name: Option<String>,
    /// Used for progress when the server sends no length / 服务器未返回长度时用于计算进度
    pub expected_size: Option<u64>,
}

impl DownloadRequest {
    pub fn new(sha256_hash: impl Into<String>) -> Self {
        Self {
            sha256_hash: sha256_hash.into(),
            file_name: None,
            expected_size: None,
        }
    }
}

/// Download outcome / 下载结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Saved(PathBuf),
    Cancelled,
}

/// Sample downloader / 样本下载器
pub struct Downloader {
    transport: Arc<dyn Transport>,
    dir: PathBuf,
}

impl Downloader {
    pub fn new(transport: Arc<dyn Transport>, dir: impl Into<PathBuf>) -> Self {
        Self {
            transport,
            dir: dir.into(),
        }
    }

    /// Target path for a sample / 样本保存路径
    pub fn target_path(&self, sha256_hash: &str) -> PathBuf {
        self.dir.join(format!("{}.zip", sha256_hash))
    }

    /// Download one sample / 下载单个样本
    pub async fn download(
        &self,
        request: &DownloadRequest,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<DownloadOutcome, SearchError> {
        let hash = request.sha256_hash.trim().to_ascii_lowercase();
        if !is_sha256(&hash) {
            return Err(SearchError::Api("illegal_sha256_hash".to_string()));
        }

        let form = vec![
            ("query".to_string(), "get_file".to_string()),
            ("sha256_hash".to_string(), hash.clone()),
        ];

        let reply = tokio::select! {
            _ = cancel.cancelled() => return Ok(DownloadOutcome::Cancelled),
            reply = self.transport.post_form_stream(&form) => reply?,
        };

        if !(200..300).contains(&reply.status) {
            return Err(TransportError::Http(reply.status).into());
        }

        let total = reply.content_length.or(request.expected_size).filter(|size| *size > 0);
        let mut body = reply.body;

        // 首块若为JSON则是错误状态 / a JSON first chunk is a status reply, not an archive
        let mut head: Vec<u8> = Vec::new();
        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Ok(DownloadOutcome::Cancelled),
                chunk = body.next() => chunk,
            };
            match chunk {
                Some(chunk) => {
                    head.extend_from_slice(&chunk?);
                    if !head.is_empty() && (head[0] != b'{' || head.len() > STATUS_PEEK_LIMIT) {
                        break;
                    }
                    if head.first() == Some(&b'{') {
                        if let Ok(resp) = serde_json::from_slice::<QueryResp>(&head) {
                            return Err(status_error(&resp.query_status, request, &hash));
                        }
                    }
                }
                None => break,
            }
        }

        if head.is_empty() {
            return Err(SearchError::FileNotFound(display_name(request, &hash)));
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let target = self.target_path(&hash);
        let partial = target.with_extension("zip.part");

        tracing::info!("Downloading sample {} to {:?}", hash, target);

        let mut reporter = ProgressReporter::new(total, progress);
        reporter.report(0);

        let written = match write_stream(&partial, head, &mut body, &mut reporter, cancel).await {
            Ok(Some(written)) => written,
            Ok(None) => {
                let _ = tokio::fs::remove_file(&partial).await;
                tracing::info!("Download of {} cancelled", hash);
                return Ok(DownloadOutcome::Cancelled);
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                tracing::warn!("Download of {} failed: {}", hash, e);
                return Err(e);
            }
        };

        tokio::fs::rename(&partial, &target).await?;
        reporter.finish();
        tracing::info!("Downloaded sample {} ({} bytes)", hash, written);

        Ok(DownloadOutcome::Saved(target))
    }
}

/// Write the peeked head and the rest of the stream / 写入已读取的首块与剩余数据
///
/// Returns `None` when cancelled.
async fn write_stream(
    path: &Path,
    head: Vec<u8>,
    body: &mut futures::stream::BoxStream<'static, Result<bytes::Bytes, TransportError>>,
    reporter: &mut ProgressReporter,
    cancel: &CancellationToken,
) -> Result<Option<u64>, SearchError> {
    let mut file = tokio::fs::File::create(path).await?;

    file.write_all(&head).await?;
    let mut written = head.len() as u64;
    reporter.advance(written);

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => return Ok(None),
            chunk = body.next() => chunk,
        };
        let Some(chunk) = chunk else { break };
        let chunk = chunk?;

        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        reporter.advance(written);
    }

    file.flush().await?;
    Ok(Some(written))
}

fn status_error(status: &str, request: &DownloadRequest, hash: &str) -> SearchError {
    match status {
        "file_not_found" => SearchError::FileNotFound(display_name(request, hash)),
        other => SearchError::Api(other.to_string()),
    }
}

fn display_name(request: &DownloadRequest, hash: &str) -> String {
    request.file_name.clone().unwrap_or_else(|| hash.to_string())
}

/// Emits each integer percentage at most once, 100 only on finish / 每个百分比最多发送一次
struct ProgressReporter {
    total: Option<u64>,
    last: Option<u8>,
    callback: Option<ProgressCallback>,
}

impl ProgressReporter {
    fn new(total: Option<u64>, callback: Option<ProgressCallback>) -> Self {
        Self {
            total,
            last: None,
            callback,
        }
    }

    fn advance(&mut self, written: u64) {
        if let Some(total) = self.total {
            let percent = (written.saturating_mul(100) / total).min(99) as u8;
            self.report(percent);
        }
    }

    fn finish(&mut self) {
        self.report(100);
    }

    fn report(&mut self, percent: u8) {
        if self.last.map_or(false, |last| percent <= last) {
            return;
        }
        self.last = Some(percent);
        if let Some(callback) = &self.callback {
            callback(percent);
        }
    }
}
