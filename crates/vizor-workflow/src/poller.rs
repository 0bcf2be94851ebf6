//! 导入任务轮询
//!
//! [`ImportOperation`] 只负责单次查询并给出结果，
//! [`wait_for_completion`] 用定时器和取消令牌驱动它直到结束。

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vizor_core::{Result, VizorError};
use vizor_integration::ManagedDicomStore;

/// 单次查询的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResult {
    Pending,
    Completed,
    /// 任务结束但带有供应商错误信息
    Failed(String),
}

/// 托管存储上的一个导入长任务
pub struct ImportOperation {
    store: Arc<dyn ManagedDicomStore>,
    name: String,
    polls: u32,
}

impl ImportOperation {
    pub fn new(store: Arc<dyn ManagedDicomStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
            polls: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// 查询一次任务状态
    pub async fn poll(&mut self) -> Result<PollResult> {
        self.polls += 1;
        let status = self.store.get_operation(&self.name).await?;
        debug!("Operation {} poll #{} done={}", self.name, self.polls, status.done);

        if !status.done {
            return Ok(PollResult::Pending);
        }
        match status.error {
            Some(message) if !message.is_empty() => Ok(PollResult::Failed(message)),
            _ => Ok(PollResult::Completed),
        }
    }
}

/// 每隔 `period` 查询一次，直到任务结束或取消
///
/// 首次查询在一个周期之后进行。取消优先于到期的定时器，
/// 也会打断正在进行中的查询。
pub async fn wait_for_completion(
    operation: &mut ImportOperation,
    period: Duration,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(operation)),
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = operation.poll() => Some(result?),
        };

        match result.ok_or_else(|| cancelled(operation))? {
            PollResult::Pending => continue,
            PollResult::Completed => {
                info!("Operation {} completed successfully", operation.name());
                return Ok(());
            }
            PollResult::Failed(message) => {
                warn!("Operation {} failed: {}", operation.name(), message);
                return Err(VizorError::Upstream(message));
            }
        }
    }
}

fn cancelled(operation: &ImportOperation) -> VizorError {
    warn!("Polling of {} cancelled after {} polls", operation.name(), operation.polls());
    VizorError::Cancelled(format!("等待任务 {} 时被取消", operation.name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vizor_integration::{ImportOutcome, InMemoryDicomStore};

    const TICK: Duration = Duration::from_millis(1);

    async fn operation(outcome: ImportOutcome) -> (Arc<InMemoryDicomStore>, ImportOperation) {
        let store = Arc::new(InMemoryDicomStore::new("stores/s"));
        store.set_import_outcome(outcome).await;
        let name = store.start_import("gs://b/p/**").await.unwrap();
        (store.clone(), ImportOperation::new(store, name))
    }

    #[tokio::test]
    async fn test_poll_states() {
        let (_, mut op) = operation(ImportOutcome::Succeed { pending_polls: 1 }).await;
        assert_eq!(op.poll().await.unwrap(), PollResult::Pending);
        assert_eq!(op.poll().await.unwrap(), PollResult::Completed);
        assert_eq!(op.polls(), 2);
    }

    #[tokio::test]
    async fn test_wait_until_done() {
        let (store, mut op) = operation(ImportOutcome::Succeed { pending_polls: 3 }).await;
        wait_for_completion(&mut op, TICK, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(store.poll_count(op.name()).await, 4);
    }

    #[tokio::test]
    async fn test_wait_reports_vendor_message() {
        let (_, mut op) = operation(ImportOutcome::Fail {
            pending_polls: 1,
            message: "invalid DICOM".to_string(),
        })
        .await;
        let err = wait_for_completion(&mut op, TICK, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.detail(), "invalid DICOM");
    }

    #[tokio::test]
    async fn test_cancel_stops_polling() {
        let (store, mut op) = operation(ImportOutcome::Hang).await;
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = wait_for_completion(&mut op, TICK, &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(store.poll_count(op.name()).await >= 1);
    }

    #[tokio::test]
    async fn test_already_cancelled_never_polls() {
        let (store, mut op) = operation(ImportOutcome::Hang).await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = wait_for_completion(&mut op, TICK, &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(store.poll_count(op.name()).await, 0);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_stalled_poll() {
        let (store, mut op) = operation(ImportOutcome::Stall).await;
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = tokio::time::timeout(Duration::from_secs(5), wait_for_completion(&mut op, TICK, &cancel))
            .await
            .expect("cancellation should interrupt the in-flight poll")
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(store.poll_count(op.name()).await, 1);
    }
}
