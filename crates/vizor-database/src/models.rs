//! 集合名称与文档转换

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use vizor_core::{Result, VizorError};

/// 上传会话，文档ID为 session_id
pub const UPLOAD_SESSIONS: &str = "upload_sessions";
/// 影像检查，文档ID为 study_id
pub const IMAGING_STUDIES: &str = "imaging_studies";
/// 切片索引，文档ID为随机ID
pub const SLICE_INDEX: &str = "imaging_slice_index";
/// 纵向索引状态，文档ID为 study_id
pub const INDEX_STATUS: &str = "imaging_longitudinal_status";

/// 序列化为JSON对象文档
pub fn to_document<T: Serialize>(value: &T) -> Result<Value> {
    let doc = serde_json::to_value(value)?;
    if !doc.is_object() {
        return Err(VizorError::Internal("文档必须是JSON对象".to_string()));
    }
    Ok(doc)
}

/// 从文档反序列化，解析失败视为存储数据损坏
pub fn from_document<T: DeserializeOwned>(collection: &str, id: &str, doc: Value) -> Result<T> {
    serde_json::from_value(doc)
        .map_err(|e| VizorError::Database(format!("无法解码 {}/{}: {}", collection, id, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vizor_core::{CreatorRole, SessionStatus, UploadSession};

    #[test]
    fn test_session_document_shape() {
        let session = UploadSession::new("SESS-1", "user-1", CreatorRole::Patient);
        let doc = to_document(&session).unwrap();
        assert_eq!(doc["status"], json!("pending"));
        assert_eq!(doc["created_by"], json!("patient"));

        let back: UploadSession = from_document(UPLOAD_SESSIONS, "SESS-1", doc).unwrap();
        assert_eq!(back.status, SessionStatus::Pending);
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(to_document(&5).is_err());
        let err = from_document::<UploadSession>(UPLOAD_SESSIONS, "x", json!({"oops": 1}));
        assert!(matches!(err, Err(VizorError::Database(_))));
    }
}
