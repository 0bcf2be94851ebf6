//! 运行上下文
//!
//! 所有外部依赖在进程启动时创建一次，再注入到各个服务。

use std::sync::Arc;
use tracing::{info, warn};
use vizor_core::{Result, Settings, VizorError};
use vizor_database::{DatabasePool, DatabaseQueries, MemoryStore, MetadataStore};
use vizor_integration::{HealthcareDicomStore, ManagedDicomStore};
use vizor_longitudinal::LongitudinalIndexer;
use vizor_storage::{ObjectSource, ObjectStoreSource};
use vizor_workflow::IngestOrchestrator;

pub struct AppContext {
    pub queries: DatabaseQueries,
    pub ingest: IngestOrchestrator,
    pub indexer: LongitudinalIndexer,
}

impl AppContext {
    /// 未配置 `database.url` 时只有 `in_memory` 为真才退回内存存储
    ///
    /// 内存存储随进程结束而丢失，`create-session` 建的会话对下一次 `ingest` 不可见。
    pub async fn build(settings: &Settings, in_memory: bool) -> Result<Self> {
        let metadata: Arc<dyn MetadataStore> = match (&settings.database.url, in_memory) {
            (Some(_), _) => Arc::new(DatabasePool::connect(&settings.database).await?),
            (None, true) => {
                warn!(
                    "database.url not set, using in-memory metadata store: \
                     state is lost when this command exits and is not visible to later invocations"
                );
                Arc::new(MemoryStore::new())
            }
            (None, false) => {
                return Err(VizorError::Config(
                    "未配置 database.url；会话与检查无法跨命令保留，确需进程内存储请加 --in-memory"
                        .to_string(),
                ))
            }
        };
        let queries = DatabaseQueries::new(metadata);

        let objects: Arc<dyn ObjectSource> =
            Arc::new(ObjectStoreSource::gcs(&[settings.imaging_bucket.as_str()])?);
        let dicom_store: Arc<dyn ManagedDicomStore> = Arc::new(HealthcareDicomStore::new(settings)?);
        info!("Managed DICOM store: {}", dicom_store.store_path());

        Ok(Self {
            ingest: IngestOrchestrator::new(
                queries.clone(),
                dicom_store.clone(),
                objects,
                settings.poll_interval(),
            ),
            indexer: LongitudinalIndexer::new(queries.clone(), dicom_store),
            queries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_database_url_fails_fast() {
        let settings = Settings::default();
        assert!(settings.database.url.is_none());
        let result = AppContext::build(&settings, false).await;
        match result {
            Err(VizorError::Config(msg)) => assert!(msg.contains("--in-memory")),
            Err(other) => panic!("unexpected error {}", other),
            Ok(_) => panic!("context built without a metadata store"),
        }
    }
}
