//! # DICOM处理模块
//!
//! 提供DICOM文件头解析与 DICOM JSON（PS3.18 F.2）数据集访问。

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
pub mod json;
pub mod parser;
pub mod tags;

pub use json::DicomJsonDataset;
pub use parser::HeaderParser;
