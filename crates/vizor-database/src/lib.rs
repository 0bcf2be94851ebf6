//! # 元数据存储模块
//!
//! 文档型元数据存储接口（内存实现与PostgreSQL JSONB实现）以及上层的类型化查询。

pub mod connection;
pub mod models;
pub mod queries;
pub mod store;

// 重新导出主要类型
pub use connection::DatabasePool;
pub use queries::DatabaseQueries;
pub use store::{BatchOp, MemoryStore, MetadataStore, OrderDirection, Query, StoredDocument, MAX_BATCH_OPS};
