//! Error types / 错误类型
//!
//! Parse errors never leave the caller's thread, transport errors are fatal to
//! a single sub-request, and `SearchError` is the one outcome a search reports.
//! 解析错误、传输错误与搜索错误的分层定义。

use thiserror::Error;

use crate::messages::ErrorCode;

/// Query parse error / 查询解析错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Query is empty after trimming / 查询为空
    #[error("no search query given")]
    NoQuery,
    /// Query syntax is wrong / 查询语法错误
    #[error("illegal search query: {0}")]
    IllegalQuery(String),
}

impl ParseError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ParseError::NoQuery => ErrorCode::NoQuery,
            ParseError::IllegalQuery(_) => ErrorCode::IllegalQuery,
        }
    }
}

/// Sub-request transport error / 子请求传输错误
///
/// Only `Timeout` is retried, everything else ends the sub-request at once.
/// 仅超时会重试，其余错误立即终止子请求。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Could not reach the API / 无法连接API
    #[error("connection error: {0}")]
    Connection(String),
    /// Non-2xx response / 非2xx响应
    #[error("HTTP error {0}")]
    Http(u16),
    /// Request timed out on every attempt / 所有尝试均超时
    #[error("request timed out ({attempts} attempt(s))")]
    Timeout { attempts: u32 },
    /// 2xx response whose body is not the expected JSON / 响应体不是预期的JSON
    #[error("malformed API response: {0}")]
    Decode(String),
}

impl TransportError {
    pub fn code(&self) -> ErrorCode {
        match self {
            TransportError::Connection(_) => ErrorCode::ConnectionError,
            TransportError::Http(_) => ErrorCode::HttpError,
            TransportError::Timeout { .. } => ErrorCode::Timeout,
            TransportError::Decode(_) => ErrorCode::UnknownError,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }
}

/// Search/download failure reported to the caller / 报告给调用方的失败
#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Non-ok `query_status` surfaced as an error (downloads only) / 非ok的查询状态
    #[error("API returned status {0}")]
    Api(String),
    /// Sample is not on the download server / 样本不存在于下载服务器
    #[error("sample {0} not found on the download server")]
    FileNotFound(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Unknown(String),
}

impl SearchError {
    /// Vocabulary code shown to the user / 面向用户的错误码
    pub fn code(&self) -> ErrorCode {
        match self {
            SearchError::Parse(e) => e.code(),
            SearchError::Transport(e) => e.code(),
            SearchError::Api(status) => ErrorCode::from_status(status),
            SearchError::FileNotFound(_) => ErrorCode::FileNotFound,
            SearchError::Io(_) | SearchError::Unknown(_) => ErrorCode::UnknownError,
        }
    }

    /// Arguments for the message template of `code()` / 消息模板参数
    pub fn format_args(&self) -> Vec<String> {
        match self {
            SearchError::Transport(TransportError::Connection(detail)) => vec![detail.clone()],
            SearchError::Transport(TransportError::Http(status)) => {
                let reason = reqwest::StatusCode::from_u16(*status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("Unknown");
                vec![status.to_string(), reason.to_string()]
            }
            SearchError::Transport(TransportError::Timeout { attempts }) => vec![attempts.to_string()],
            SearchError::FileNotFound(name) => vec![name.clone()],
            SearchError::Io(e) => vec![e.to_string()],
            SearchError::Unknown(detail) => vec![detail.clone()],
            SearchError::Transport(TransportError::Decode(detail)) => vec![detail.clone()],
            _ => Vec::new(),
        }
    }
}
