//! 托管DICOM存储接口

use async_trait::async_trait;
use vizor_core::Result;
use vizor_dicom::DicomJsonDataset;

/// 长任务当前状态
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationStatus {
    pub done: bool,
    /// 任务以失败结束时的供应商错误信息
    pub error: Option<String>,
}

impl OperationStatus {
    pub fn running() -> Self {
        Self::default()
    }

    pub fn succeeded() -> Self {
        Self {
            done: true,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            done: true,
            error: Some(message.into()),
        }
    }
}

/// 托管DICOM存储
#[async_trait]
pub trait ManagedDicomStore: Send + Sync {
    /// 存储资源路径，记录在检查上
    fn store_path(&self) -> &str;

    /// 从对象存储批量导入，返回长任务名
    async fn start_import(&self, source_uri: &str) -> Result<String>;

    async fn get_operation(&self, operation: &str) -> Result<OperationStatus>;

    /// 检查下全部实例的 DICOM JSON 元数据
    async fn study_metadata(&self, study_instance_uid: &str) -> Result<Vec<DicomJsonDataset>>;
}
