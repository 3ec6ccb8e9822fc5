//! Search orchestration core / 搜索编排核心
//!
//! - query: raw query -> request batch / 查询解析
//! - executor: one sub-request with retry / 单个子请求
//! - coordinator: concurrent batch, aggregation, cancellation / 并发批次协调
//! - aggregate: dedup and state / 去重与状态

pub mod aggregate;
pub mod coordinator;
pub mod executor;
pub mod query;
pub mod retry;
pub mod types;

pub use aggregate::{dedup_by_hash, SearchState, Transition};
pub use coordinator::{CoordinatorSettings, SearchCoordinator, SearchHandle};
pub use executor::{ExecutorSettings, RequestExecutor, SubRequestEvent};
pub use query::{parse, Filter, QueryKind, QueryParser, RequestBatch, RequestSpec};
pub use retry::{RetryFailure, RetryPolicy};
pub use types::{SearchEvent, SearchOutcome};
