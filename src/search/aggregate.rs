//! Result aggregation / 结果聚合
//!
//! `SearchState` is owned by the coordinator task alone; sub-requests only
//! ever reach it through their terminal message.

use std::collections::HashSet;

use super::executor::SubRequestEvent;
use crate::error::TransportError;
use crate::models::{SampleRecord, SearchResult};

/// Keep the first record per `sha256_hash`, preserving order / 按哈希去重，保留首次出现
pub fn dedup_by_hash(records: Vec<SampleRecord>) -> Vec<SampleRecord> {
    let mut seen: HashSet<String> = HashSet::with_capacity(records.len());
    records
        .into_iter()
        .filter(|record| seen.insert(record.sha256_hash.clone()))
        .collect()
}

/// What the coordinator should do after applying an event / 应用事件后的状态转换
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Keep waiting / 继续等待
    Continue,
    /// Every sub-request reported / 全部完成
    AllReported,
    /// First fatal error / 首个致命错误
    Failed(TransportError),
}

/// Aggregation state of one running search / 运行中搜索的聚合状态
#[derive(Debug)]
pub struct SearchState {
    total_specs: usize,
    completed_count: usize,
    collected: Vec<SampleRecord>,
    empty_statuses: Vec<String>,
    cancelled: bool,
    terminal_error: Option<TransportError>,
}

impl SearchState {
    pub fn new(total_specs: usize) -> Self {
        Self {
            total_specs,
            completed_count: 0,
            collected: Vec::new(),
            empty_statuses: Vec::new(),
            cancelled: false,
            terminal_error: None,
        }
    }

    pub fn total_specs(&self) -> usize {
        self.total_specs
    }

    pub fn completed_count(&self) -> usize {
        self.completed_count
    }

    pub fn is_terminal(&self) -> bool {
        self.cancelled || self.terminal_error.is_some() || self.completed_count == self.total_specs
    }

    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    /// Apply one sub-request terminal event / 应用一个子请求终止事件
    ///
    /// Events arriving after the terminal transition are ignored.
    pub fn apply(&mut self, event: SubRequestEvent) -> Transition {
        if self.is_terminal() {
            return Transition::Continue;
        }

        self.completed_count += 1;

        match event {
            SubRequestEvent::Success(records) => self.collected.extend(records),
            SubRequestEvent::Empty(status) => self.empty_statuses.push(status),
            SubRequestEvent::Failure(error) => {
                self.terminal_error = Some(error.clone());
                return Transition::Failed(error);
            }
            // 仅在批次已被取消后出现 / only seen once the batch was told to stop
            SubRequestEvent::Cancelled => {}
        }

        if self.completed_count == self.total_specs {
            Transition::AllReported
        } else {
            Transition::Continue
        }
    }

    /// Consume into the deduplicated result / 生成去重后的结果
    pub fn into_result(self) -> SearchResult {
        SearchResult {
            records: dedup_by_hash(self.collected),
            empty_statuses: self.empty_statuses,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(hash: &str, tags: &[&str]) -> SampleRecord {
        SampleRecord {
            file_name: format!("{}.exe", hash),
            file_type: "exe".to_string(),
            file_size: 10,
            signature: String::new(),
            sha256_hash: hash.to_string(),
            first_seen: String::new(),
            downloads: 0,
            uploads: 0,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn test_dedup_keeps_first() {
        let first = record("aa", &["exe"]);
        let records = vec![first.clone(), record("bb", &[]), record("aa", &["dll", "other"])];

        let deduped = dedup_by_hash(records);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0], first);
        assert_eq!(deduped[1].sha256_hash, "bb");
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let once = dedup_by_hash(vec![record("aa", &["x"]), record("aa", &["y"])]);
        let twice = dedup_by_hash(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_all_reported() {
        let mut state = SearchState::new(2);
        assert_eq!(state.apply(SubRequestEvent::Success(vec![record("aa", &[])])), Transition::Continue);
        assert_eq!(state.apply(SubRequestEvent::Empty("no_results".into())), Transition::AllReported);
        assert_eq!(state.completed_count(), 2);

        let result = state.into_result();
        assert_eq!(result.len(), 1);
        assert_eq!(result.empty_statuses, vec!["no_results".to_string()]);
    }

    #[test]
    fn test_failure_is_terminal() {
        let mut state = SearchState::new(3);
        assert_eq!(
            state.apply(SubRequestEvent::Failure(TransportError::Http(500))),
            Transition::Failed(TransportError::Http(500))
        );
        assert!(state.is_terminal());

        // 终止后的事件被忽略 / later events are ignored
        assert_eq!(state.apply(SubRequestEvent::Failure(TransportError::Http(502))), Transition::Continue);
        assert_eq!(state.completed_count(), 1);
    }

    #[test]
    fn test_all_empty_gives_empty_result() {
        let mut state = SearchState::new(2);
        state.apply(SubRequestEvent::Empty("tag_not_found".into()));
        assert_eq!(state.apply(SubRequestEvent::Empty("no_results".into())), Transition::AllReported);

        let result = state.into_result();
        assert!(result.is_empty());
        assert_eq!(result.empty_reason(), Some(crate::messages::ErrorCode::TagNotFound));
    }

    #[test]
    fn test_cancelled_state_ignores_events() {
        let mut state = SearchState::new(2);
        state.mark_cancelled();
        assert_eq!(state.apply(SubRequestEvent::Success(vec![record("aa", &[])])), Transition::Continue);
        assert_eq!(state.completed_count(), 0);
    }
}
