//! # 对象存储模块
//!
//! 解析上传会话的 `gs://` 源位置，并按前缀枚举、读取对象。

pub mod location;
pub mod source;

pub use location::SourceLocation;
pub use source::{ObjectEntry, ObjectSource, ObjectStoreSource};
