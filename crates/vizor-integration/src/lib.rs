//! # 托管DICOM存储集成模块
//!
//! 对接云端托管DICOM存储：批量导入、长任务查询与 DICOMweb 检查元数据读取。
//! - `HealthcareDicomStore`：Cloud Healthcare REST 接口客户端
//! - `InMemoryDicomStore`：进程内实现，可编排导入结果

pub mod dicom_store;
pub mod healthcare;
pub mod memory;

pub use dicom_store::{ManagedDicomStore, OperationStatus};
pub use healthcare::HealthcareDicomStore;
pub use memory::{ImportOutcome, InMemoryDicomStore};
