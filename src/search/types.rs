use serde::Serialize;
use uuid::Uuid;

use crate::error::SearchError;
use crate::messages::ErrorCode;
use crate::models::SearchResult;

/// Search event (progress stream for the display layer) / 搜索事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchEvent {
    /// One more sub-request reported / 又一个子请求完成
    Progress { search_id: Uuid, completed: usize, total: usize },
    Completed { search_id: Uuid, count: usize },
    Failed { search_id: Uuid, code: ErrorCode },
    Cancelled { search_id: Uuid },
}

impl SearchEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SearchEvent::Progress { .. })
    }
}

/// Final outcome of a search, produced exactly once / 搜索的最终结果(仅产生一次)
#[derive(Debug)]
pub enum SearchOutcome {
    /// All sub-requests reported; may be empty / 全部完成(可能为空)
    Completed(SearchResult),
    /// First fatal error / 首个致命错误
    Failed(SearchError),
    /// Cancelled by the caller, distinct from an empty result / 被调用方取消
    Cancelled,
}

impl SearchOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SearchOutcome::Cancelled)
    }

    /// Error code to show, if any / 需要显示的错误码
    ///
    /// An empty completed search maps to its `empty_reason`.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            SearchOutcome::Completed(result) => result.empty_reason(),
            SearchOutcome::Failed(error) => Some(error.code()),
            SearchOutcome::Cancelled => None,
        }
    }
}
