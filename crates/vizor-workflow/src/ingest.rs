//! 导入编排
//!
//! 一次导入按顺序执行：标记导入中 → 启动批量导入 → 轮询任务 →
//! 扫描文件头 → 汇总检查 → 标记可查看。状态与错误信息每次都立即合并写入会话。
//! 取消时直接返回，不再修改会话状态；其他失败都会把会话标记为 `error`。

use crate::assembler::StudyAssembler;
use crate::poller::{wait_for_completion, ImportOperation};
use crate::scanner::HeaderScanner;
use crate::state_machine::{SessionEvent, SessionStateMachine};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use vizor_core::{Result, SessionStatus, SessionUpdate, Study, UploadSession, VizorError};
use vizor_database::DatabaseQueries;
use vizor_integration::ManagedDicomStore;
use vizor_storage::{ObjectSource, SourceLocation};

/// 导入编排器
pub struct IngestOrchestrator {
    queries: DatabaseQueries,
    dicom_store: Arc<dyn ManagedDicomStore>,
    scanner: HeaderScanner,
    assembler: StudyAssembler,
    state_machine: SessionStateMachine,
    poll_interval: Duration,
}

impl IngestOrchestrator {
    pub fn new(
        queries: DatabaseQueries,
        dicom_store: Arc<dyn ManagedDicomStore>,
        objects: Arc<dyn ObjectSource>,
        poll_interval: Duration,
    ) -> Self {
        let assembler = StudyAssembler::new(queries.clone(), dicom_store.store_path());
        Self {
            queries,
            dicom_store,
            scanner: HeaderScanner::new(objects),
            assembler,
            state_machine: SessionStateMachine::new(),
            poll_interval,
        }
    }

    /// 导入会话源位置下的文件，成功时返回新建的检查
    ///
    /// 同一会话的重复触发不做去重，调用方可以在失败后重新投递。
    pub async fn trigger_ingest(
        &self,
        session_id: &str,
        source_location: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Study>> {
        let session_id = session_id.trim();
        let source_location = source_location.trim();
        if session_id.is_empty() || source_location.is_empty() {
            return Err(VizorError::Validation(
                "session_id 和 source_location 不能为空".to_string(),
            ));
        }

        let session = self
            .queries
            .get_upload_session(session_id)
            .await?
            .ok_or_else(|| VizorError::NotFound(format!("上传会话 {} 不存在", session_id)))?;

        if session.status == SessionStatus::Ready {
            warn!("Session {} is already ready, importing again", session_id);
        }
        let importing = self
            .state_machine
            .transition(session.status, SessionEvent::ImportStarted)?;

        self.queries
            .update_upload_session(
                session_id,
                &SessionUpdate {
                    status: Some(importing),
                    source_location: Some(source_location.to_string()),
                    import_operation: Some(String::new()),
                    error_message: Some(String::new()),
                },
            )
            .await?;
        info!("Session {} importing from {}", session_id, source_location);

        match self.run(&session, importing, source_location, cancel).await {
            Ok(studies) => {
                info!("Session {} ready with {} studies", session_id, studies.len());
                Ok(studies)
            }
            Err(e) if e.is_cancelled() => {
                warn!("Ingest of session {} cancelled", session_id);
                Err(e)
            }
            Err(e) => {
                error!("Ingest of session {} failed: {}", session_id, e);
                self.mark_failed(session_id, importing, &e).await;
                Err(e)
            }
        }
    }

    /// 写入 `ready` 也在这里完成，失败时同样把会话标记为 `error`
    async fn run(
        &self,
        session: &UploadSession,
        importing: SessionStatus,
        source_location: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Study>> {
        let location = SourceLocation::parse(source_location)?;

        let operation = self.dicom_store.start_import(&location.import_uri()).await?;
        self.queries
            .update_upload_session(
                &session.session_id,
                &SessionUpdate {
                    import_operation: Some(operation.clone()),
                    ..Default::default()
                },
            )
            .await?;

        let mut operation = ImportOperation::new(self.dicom_store.clone(), operation);
        wait_for_completion(&mut operation, self.poll_interval, cancel).await?;

        let groups = self.scanner.scan(&location).await?;
        let studies = self
            .assembler
            .assemble_and_persist(session, &location, &groups)
            .await?;

        let ready = self
            .state_machine
            .transition(importing, SessionEvent::ImportSucceeded)?;
        self.queries
            .update_upload_session(&session.session_id, &SessionUpdate::status(ready))
            .await?;
        Ok(studies)
    }

    /// 记录失败；写入本身失败时只记日志，返回原始错误
    async fn mark_failed(&self, session_id: &str, from: SessionStatus, cause: &VizorError) {
        let status = self
            .state_machine
            .transition(from, SessionEvent::Failed)
            .unwrap_or(SessionStatus::Error);
        let update = SessionUpdate {
            status: Some(status),
            error_message: Some(cause.detail()),
            ..Default::default()
        };
        if let Err(e) = self.queries.update_upload_session(session_id, &update).await {
            error!("Failed to record error on session {}: {}", session_id, e);
        }
    }
}
