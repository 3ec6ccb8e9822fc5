//! MalwareBazaar API access / MalwareBazaar API访问
//!
//! `Transport` is the only seam between the search core and the network:
//! the executor and the downloader are written against it, `BazaarClient`
//! implements it with reqwest.

pub mod client;
pub mod types;

pub use client::{BazaarClient, API_KEY_HEADER};
pub use types::*;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::TransportError;

/// Form-encoded request body / 表单请求体
pub type Form = Vec<(String, String)>;

/// Buffered API reply / 缓冲的API响应
#[derive(Debug, Clone)]
pub struct ApiReply {
    pub status: u16,
    pub body: Bytes,
}

impl ApiReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Streaming API reply (downloads) / 流式API响应(下载)
pub struct StreamReply {
    pub status: u16,
    pub content_length: Option<u64>,
    pub body: BoxStream<'static, Result<Bytes, TransportError>>,
}

/// Transport interface (provides only primitive operations) / 传输接口
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST a form and buffer the whole reply / 发送表单并读取完整响应
    async fn post_form(&self, form: &Form) -> Result<ApiReply, TransportError>;

    /// POST a form and stream the reply body / 发送表单并以流的方式读取响应
    async fn post_form_stream(&self, form: &Form) -> Result<StreamReply, TransportError>;
}
