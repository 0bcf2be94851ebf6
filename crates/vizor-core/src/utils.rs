//! 通用工具函数

use uuid::Uuid;

/// 生成形如 `STUDY-3F9A1C2B` 的短标识
pub fn generate_token_id(prefix: &str) -> String {
    let raw = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("{}-{}", prefix, &raw[..8])
}

/// 生成索引文档ID
pub fn generate_document_id() -> String {
    Uuid::new_v4().simple().to_string()
}
