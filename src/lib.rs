//! # Vizor
//!
//! 纵向影像服务的统一入口，重新导出各子模块。

pub use vizor_core as core;
pub use vizor_database as database;
pub use vizor_dicom as dicom;
pub use vizor_integration as integration;
pub use vizor_longitudinal as longitudinal;
pub use vizor_storage as storage;
pub use vizor_workflow as workflow;
