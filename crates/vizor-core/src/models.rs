//! 核心数据模型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 上传会话状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,   // 已创建
    Uploading, // 上传中
    Uploaded,  // 上传完成
    Importing, // 导入DICOM存储中
    Ready,     // 可查看
    Error,     // 失败
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Uploading => "uploading",
            SessionStatus::Uploaded => "uploaded",
            SessionStatus::Importing => "importing",
            SessionStatus::Ready => "ready",
            SessionStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// 会话创建者角色
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CreatorRole {
    Patient,
    Provider,
}

/// 上传会话
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadSession {
    pub session_id: String,
    pub user_id: String,
    pub created_by: CreatorRole,
    pub status: SessionStatus,
    /// 形如 gs://bucket/<userId>/<sessionId>/
    #[serde(default)]
    pub source_location: String,
    /// 托管DICOM存储返回的长任务名
    #[serde(default)]
    pub import_operation: String,
    #[serde(default)]
    pub error_message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadSession {
    pub fn new(session_id: &str, user_id: &str, created_by: CreatorRole) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            created_by,
            status: SessionStatus::Pending,
            source_location: String::new(),
            import_operation: String::new(),
            error_message: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// 上传会话的部分更新，仅写入非空字段
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SessionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl SessionUpdate {
    pub fn status(status: SessionStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            status: Some(SessionStatus::Error),
            error_message: Some(detail.into()),
            ..Default::default()
        }
    }
}

/// 从单个DICOM文件头提取的实例信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceHeader {
    pub study_instance_uid: String,
    pub series_instance_uid: String,
    pub sop_instance_uid: String,
    pub modality: String,
    pub study_date: String,
    pub study_description: String,
}

impl InstanceHeader {
    /// 检查UID与SOP实例UID都存在才算有效实例
    pub fn is_usable(&self) -> bool {
        !self.study_instance_uid.is_empty() && !self.sop_instance_uid.is_empty()
    }
}

/// 逻辑检查（按 StudyInstanceUID 聚合）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Study {
    pub study_id: String,
    pub user_id: String,
    pub session_id: String,
    pub study_instance_uid: String,
    pub series_instance_uids: Vec<String>,
    pub modalities_in_study: Vec<String>,
    pub study_date: String,
    pub study_description: String,
    pub num_instances: usize,
    pub source_location: String,
    pub dicom_store_path: String,
    pub created_at: DateTime<Utc>,
}

/// 纵向索引中的单个切片
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedSlice {
    pub study_id: String,
    pub patient_user_id: String,
    pub study_instance_uid: String,
    pub series_instance_uid: String,
    pub sop_instance_uid: String,
    pub instance_number: i32,
    pub frame_of_reference_uid: String,

    pub image_position: [f64; 3],
    pub row_direction: [f64; 3],
    pub column_direction: [f64; 3],
    /// (行间距, 列间距)
    pub pixel_spacing: [f64; 2],

    /// 平面方程: normal · x = plane_offset
    pub normal: [f64; 3],
    pub plane_offset: f64,

    pub study_date: String,
    #[serde(default)]
    pub acquisition_time: String,
    pub created_at: DateTime<Utc>,
}

/// 纵向索引状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    NotIndexed,
    Indexing,
    Indexed,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LongitudinalIndexStatus {
    pub study_id: String,
    pub patient_user_id: String,
    pub status: IndexStatus,
    #[serde(default)]
    pub last_error: String,
    pub updated_at: DateTime<Utc>,
}

impl LongitudinalIndexStatus {
    pub fn new(study: &Study, status: IndexStatus, last_error: impl Into<String>) -> Self {
        Self {
            study_id: study.study_id.clone(),
            patient_user_id: study.user_id.clone(),
            status,
            last_error: last_error.into(),
            updated_at: Utc::now(),
        }
    }
}

/// 跨检查定位结果，每个检查至多一条
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PointMatch {
    pub study_id: String,
    pub study_instance_uid: String,
    pub series_instance_uid: String,
    pub sop_instance_uid: String,
    pub instance_number: i32,
    pub row: f64,
    pub col: f64,
    /// 点到切片平面的距离（毫米）
    pub distance: f64,
}
