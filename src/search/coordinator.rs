//! Search coordinator / 搜索协调器
//!
//! One supervisor task per search owns the `SearchState`; each sub-request
//! runs in its own task and sends exactly one terminal message back over an
//! mpsc channel. The supervisor is the only place an outcome is produced.
//!
//! State machine: Running -> Done(Completed) | Done(Failed) | Cancelled.
//! 状态机：运行中 -> 完成 | 失败 | 已取消，终止状态不可离开。

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::aggregate::{SearchState, Transition};
use super::executor::{RequestExecutor, SubRequestEvent};
use super::query::{QueryParser, RequestBatch};
use super::types::{SearchEvent, SearchOutcome};
use crate::error::SearchError;

/// Coordinator settings / 协调器设置
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorSettings {
    /// Start offset per sub-request index / 每个子请求的启动间隔
    pub stagger_interval: Duration,
    /// Minimum event channel capacity / 事件通道最小容量
    pub event_capacity: usize,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            stagger_interval: Duration::from_millis(500),
            event_capacity: 64,
        }
    }
}

/// Search coordinator / 搜索协调器
#[derive(Clone)]
pub struct SearchCoordinator {
    executor: Arc<RequestExecutor>,
    settings: CoordinatorSettings,
}

impl SearchCoordinator {
    pub fn new(executor: Arc<RequestExecutor>, settings: CoordinatorSettings) -> Self {
        Self { executor, settings }
    }

    /// Start a search in the background / 在后台启动搜索
    pub fn start(&self, batch: RequestBatch) -> SearchHandle {
        let search_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let capacity = self.settings.event_capacity.max(batch.len() + 2);
        let (event_sender, events) = broadcast::channel(capacity);
        let (outcome_tx, outcome_rx) = oneshot::channel();

        let supervisor = Supervisor {
            search_id,
            executor: self.executor.clone(),
            stagger_interval: self.settings.stagger_interval,
            cancel: cancel.clone(),
            events: event_sender.clone(),
        };
        tokio::spawn(supervisor.run(batch, outcome_tx));

        SearchHandle {
            search_id,
            cancel,
            event_sender,
            events: Some(events),
            outcome: outcome_rx,
        }
    }

    /// Parse, run and wait for the outcome / 解析、执行并等待结果
    pub async fn search(&self, parser: &QueryParser, raw_query: &str) -> SearchOutcome {
        match parser.parse(raw_query) {
            Ok(batch) => self.start(batch).outcome().await,
            Err(e) => {
                tracing::info!("query rejected: {}", e);
                SearchOutcome::Failed(e.into())
            }
        }
    }
}

/// Handle to a running search / 运行中搜索的句柄
pub struct SearchHandle {
    search_id: Uuid,
    cancel: CancellationToken,
    event_sender: broadcast::Sender<SearchEvent>,
    events: Option<broadcast::Receiver<SearchEvent>>,
    outcome: oneshot::Receiver<SearchOutcome>,
}

impl SearchHandle {
    pub fn search_id(&self) -> Uuid {
        self.search_id
    }

    /// Request cancellation; no-op once the search is terminal / 请求取消
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this search, for other tasks / 供其他任务使用的取消令牌
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Receiver holding every event since `start` (first call only) / 自启动以来的全部事件
    pub fn take_events(&mut self) -> Option<broadcast::Receiver<SearchEvent>> {
        self.events.take()
    }

    /// Subscribe to events from now on / 订阅此后的事件
    pub fn subscribe(&self) -> broadcast::Receiver<SearchEvent> {
        self.event_sender.subscribe()
    }

    /// Wait for the single outcome / 等待唯一的最终结果
    pub async fn outcome(mut self) -> SearchOutcome {
        (&mut self.outcome).await.unwrap_or_else(|_| {
            SearchOutcome::Failed(SearchError::Unknown(
                "search supervisor stopped without an outcome".to_string(),
            ))
        })
    }
}

/// Nobody can read the outcome any more, stop the batch / 句柄丢弃时取消搜索
impl Drop for SearchHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Supervisor {
    search_id: Uuid,
    executor: Arc<RequestExecutor>,
    stagger_interval: Duration,
    cancel: CancellationToken,
    events: broadcast::Sender<SearchEvent>,
}

impl Supervisor {
    async fn run(self, batch: RequestBatch, outcome_tx: oneshot::Sender<SearchOutcome>) {
        let total = batch.len();
        // 失败时只取消子请求，不影响外部令牌 / fail-fast cancels the batch, not the caller's token
        let batch_token = self.cancel.child_token();
        let (tx, mut rx) = mpsc::channel::<(usize, SubRequestEvent)>(total);

        tracing::info!("search {} started with {} sub-request(s)", self.search_id, total);

        let mut tasks: Vec<JoinHandle<()>> = Vec::with_capacity(total);
        for (index, spec) in batch.into_specs().into_iter().enumerate() {
            let start_delay = self.stagger_interval * index as u32;
            let executor = self.executor.clone();
            let token = batch_token.clone();
            let tx = tx.clone();

            tasks.push(tokio::spawn(async move {
                let event = executor.execute(&spec, start_delay, &token).await;
                let _ = tx.send((index, event)).await;
            }));
        }
        drop(tx);

        let mut state = SearchState::new(total);
        let outcome = loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    state.mark_cancelled();
                    tracing::info!(
                        "search {} cancelled after {}/{} sub-request(s), waiting for the rest to stop",
                        self.search_id,
                        state.completed_count(),
                        total
                    );
                    while rx.recv().await.is_some() {}
                    break SearchOutcome::Cancelled;
                }

                message = rx.recv() => match message {
                    Some((index, event)) => {
                        tracing::debug!("search {} sub-request #{} reported", self.search_id, index);
                        let transition = state.apply(event);
                        self.progress(&state);

                        match transition {
                            Transition::Continue => {}
                            Transition::AllReported => break SearchOutcome::Completed(state.into_result()),
                            Transition::Failed(error) => {
                                tracing::warn!(
                                    "search {} aborted by sub-request #{}: {}",
                                    self.search_id,
                                    index,
                                    error
                                );
                                batch_token.cancel();
                                break SearchOutcome::Failed(error.into());
                            }
                        }
                    }
                    None => {
                        batch_token.cancel();
                        break SearchOutcome::Failed(SearchError::Unknown(format!(
                            "{} sub-request(s) ended without reporting",
                            total - state.completed_count()
                        )));
                    }
                },
            }
        };

        let event = match &outcome {
            SearchOutcome::Completed(result) => {
                tracing::info!("search {} completed with {} unique sample(s)", self.search_id, result.len());
                SearchEvent::Completed { search_id: self.search_id, count: result.len() }
            }
            SearchOutcome::Failed(error) => {
                tracing::warn!("search {} failed: {}", self.search_id, error);
                SearchEvent::Failed { search_id: self.search_id, code: error.code() }
            }
            SearchOutcome::Cancelled => SearchEvent::Cancelled { search_id: self.search_id },
        };
        let _ = self.events.send(event);
        let _ = outcome_tx.send(outcome);

        // 回收子任务 / reap sub-request tasks
        for task in tasks {
            if let Err(e) = task.await {
                if e.is_panic() {
                    tracing::error!("search {} sub-request task panicked: {}", self.search_id, e);
                }
            }
        }
    }

    fn progress(&self, state: &SearchState) {
        let _ = self.events.send(SearchEvent::Progress {
            search_id: self.search_id,
            completed: state.completed_count(),
            total: state.total_specs(),
        });
    }
}
