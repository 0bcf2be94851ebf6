//! 进程内托管存储
//!
//! 用于测试和本地演示：导入结果可预先设定，检查元数据直接放入。

use crate::dicom_store::{ManagedDicomStore, OperationStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;
use vizor_core::{Result, VizorError};
use vizor_dicom::DicomJsonDataset;

/// 后续导入任务的结局
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    /// 经过若干次"未完成"查询后成功
    Succeed { pending_polls: u32 },
    /// 经过若干次"未完成"查询后以错误结束
    Fail { pending_polls: u32, message: String },
    /// 导入请求本身被拒绝
    Reject(String),
    /// 任务永不结束
    Hang,
    /// 状态查询本身永不返回
    Stall,
}

#[derive(Debug)]
struct Operation {
    outcome: ImportOutcome,
    polls: u32,
}

#[derive(Debug, Default)]
struct State {
    imports: Vec<String>,
    operations: HashMap<String, Operation>,
    studies: HashMap<String, Vec<DicomJsonDataset>>,
}

pub struct InMemoryDicomStore {
    store_path: String,
    outcome: Mutex<ImportOutcome>,
    state: Mutex<State>,
}

impl InMemoryDicomStore {
    pub fn new(store_path: &str) -> Self {
        Self {
            store_path: store_path.to_string(),
            outcome: Mutex::new(ImportOutcome::Succeed { pending_polls: 0 }),
            state: Mutex::new(State::default()),
        }
    }

    pub async fn set_import_outcome(&self, outcome: ImportOutcome) {
        *self.outcome.lock().await = outcome;
    }

    /// 放入（替换）一个检查的实例元数据
    pub async fn put_study(&self, study_instance_uid: &str, datasets: Vec<DicomJsonDataset>) {
        self.state
            .lock()
            .await
            .studies
            .insert(study_instance_uid.to_string(), datasets);
    }

    /// 已收到的导入URI
    pub async fn imports(&self) -> Vec<String> {
        self.state.lock().await.imports.clone()
    }

    /// 某任务被查询的次数
    pub async fn poll_count(&self, operation: &str) -> u32 {
        self.state
            .lock()
            .await
            .operations
            .get(operation)
            .map(|op| op.polls)
            .unwrap_or(0)
    }
}

#[async_trait]
impl ManagedDicomStore for InMemoryDicomStore {
    fn store_path(&self) -> &str {
        &self.store_path
    }

    async fn start_import(&self, source_uri: &str) -> Result<String> {
        let outcome = self.outcome.lock().await.clone();
        if let ImportOutcome::Reject(message) = outcome {
            return Err(VizorError::Upstream(message));
        }

        let mut state = self.state.lock().await;
        state.imports.push(source_uri.to_string());
        let name = format!("{}/operations/{}", self.store_path, state.imports.len());
        state
            .operations
            .insert(name.clone(), Operation { outcome, polls: 0 });
        debug!("In-memory import of {} started as {}", source_uri, name);
        Ok(name)
    }

    async fn get_operation(&self, operation: &str) -> Result<OperationStatus> {
        let mut state = self.state.lock().await;
        let op = state
            .operations
            .get_mut(operation)
            .ok_or_else(|| VizorError::Upstream(format!("未知的任务: {}", operation)))?;
        op.polls += 1;
        if op.outcome == ImportOutcome::Stall {
            drop(state);
            debug!("In-memory operation {} stalled", operation);
            return std::future::pending().await;
        }

        let status = match &op.outcome {
            ImportOutcome::Succeed { pending_polls } if op.polls > *pending_polls => {
                OperationStatus::succeeded()
            }
            ImportOutcome::Fail {
                pending_polls,
                message,
            } if op.polls > *pending_polls => OperationStatus::failed(message.clone()),
            _ => OperationStatus::running(),
        };
        Ok(status)
    }

    async fn study_metadata(&self, study_instance_uid: &str) -> Result<Vec<DicomJsonDataset>> {
        let state = self.state.lock().await;
        state
            .studies
            .get(study_instance_uid)
            .cloned()
            .ok_or_else(|| VizorError::NotFound(format!("存储中没有检查 {}", study_instance_uid)))
    }
}
