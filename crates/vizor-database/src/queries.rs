//! 类型化的元数据查询操作

use crate::models::*;
use crate::store::{BatchOp, MetadataStore, OrderDirection, Query, MAX_BATCH_OPS};
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use vizor_core::utils::generate_document_id;
use vizor_core::{
    IndexedSlice, LongitudinalIndexStatus, Result, SessionUpdate, Study, UploadSession,
};

/// 数据库查询操作接口
#[derive(Clone)]
pub struct DatabaseQueries {
    store: Arc<dyn MetadataStore>,
}

impl DatabaseQueries {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    // ========== 上传会话 ==========

    pub async fn create_upload_session(&self, session: &UploadSession) -> Result<()> {
        self.store
            .set(UPLOAD_SESSIONS, &session.session_id, to_document(session)?)
            .await
    }

    pub async fn get_upload_session(&self, session_id: &str) -> Result<Option<UploadSession>> {
        match self.store.get(UPLOAD_SESSIONS, session_id).await? {
            Some(doc) => Ok(Some(from_document(UPLOAD_SESSIONS, session_id, doc)?)),
            None => Ok(None),
        }
    }

    /// 合并写入会话的部分字段，并刷新 updated_at
    pub async fn update_upload_session(&self, session_id: &str, update: &SessionUpdate) -> Result<()> {
        let mut doc = to_document(update)?;
        if let Some(fields) = doc.as_object_mut() {
            fields.insert("updated_at".to_string(), json!(Utc::now()));
        }
        self.store.merge_set(UPLOAD_SESSIONS, session_id, doc).await
    }

    // ========== 影像检查 ==========

    pub async fn create_study(&self, study: &Study) -> Result<()> {
        self.store
            .set(IMAGING_STUDIES, &study.study_id, to_document(study)?)
            .await?;
        debug!("Created study {} ({})", study.study_id, study.study_instance_uid);
        Ok(())
    }

    pub async fn get_study(&self, study_id: &str) -> Result<Option<Study>> {
        match self.store.get(IMAGING_STUDIES, study_id).await? {
            Some(doc) => Ok(Some(from_document(IMAGING_STUDIES, study_id, doc)?)),
            None => Ok(None),
        }
    }

    /// 用户的全部检查，按创建时间倒序
    pub async fn list_studies_by_user(&self, user_id: &str) -> Result<Vec<Study>> {
        let docs = self
            .store
            .query(&Query::new(IMAGING_STUDIES).filter("user_id", user_id))
            .await?;
        let mut studies = docs
            .into_iter()
            .map(|doc| from_document::<Study>(IMAGING_STUDIES, &doc.id, doc.data))
            .collect::<Result<Vec<_>>>()?;
        studies.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.study_id.cmp(&b.study_id))
        });
        Ok(studies)
    }

    /// 按 StudyInstanceUID 查找用户的检查
    pub async fn get_study_by_instance_uid(
        &self,
        user_id: &str,
        study_instance_uid: &str,
    ) -> Result<Option<Study>> {
        let docs = self
            .store
            .query(
                &Query::new(IMAGING_STUDIES)
                    .filter("user_id", user_id)
                    .filter("study_instance_uid", study_instance_uid)
                    .limit(1),
            )
            .await?;
        match docs.into_iter().next() {
            Some(doc) => Ok(Some(from_document(IMAGING_STUDIES, &doc.id, doc.data)?)),
            None => Ok(None),
        }
    }

    // ========== 切片索引 ==========

    /// 替换检查的全部切片索引
    ///
    /// 分两阶段执行：先分批删除旧文档，再分批写入新文档。两阶段之间
    /// 以及批次之间没有事务，并发读取可能看到空的或不完整的索引。
    pub async fn replace_indexed_slices(&self, study_id: &str, slices: &[IndexedSlice]) -> Result<usize> {
        let existing = self
            .store
            .query(&Query::new(SLICE_INDEX).filter("study_id", study_id))
            .await?;
        let deleted = existing.len();

        // 删除阶段
        for chunk in existing.chunks(MAX_BATCH_OPS) {
            let ops = chunk
                .iter()
                .map(|doc| BatchOp::Delete {
                    collection: SLICE_INDEX.to_string(),
                    id: doc.id.clone(),
                })
                .collect();
            self.store.batch_write(ops).await?;
        }

        // 写入阶段
        for chunk in slices.chunks(MAX_BATCH_OPS) {
            let ops = chunk
                .iter()
                .map(|slice| {
                    Ok(BatchOp::Set {
                        collection: SLICE_INDEX.to_string(),
                        id: generate_document_id(),
                        data: to_document(slice)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            self.store.batch_write(ops).await?;
        }

        info!(
            "Replaced slice index for study {}: removed {}, wrote {}",
            study_id,
            deleted,
            slices.len()
        );
        Ok(slices.len())
    }

    /// 检查在某参考坐标系下的全部切片，按 InstanceNumber 升序
    pub async fn list_indexed_slices(
        &self,
        study_id: &str,
        frame_of_reference_uid: &str,
    ) -> Result<Vec<IndexedSlice>> {
        let docs = self
            .store
            .query(
                &Query::new(SLICE_INDEX)
                    .filter("study_id", study_id)
                    .filter("frame_of_reference_uid", frame_of_reference_uid)
                    .order_by("instance_number", OrderDirection::Ascending),
            )
            .await?;
        docs.into_iter()
            .map(|doc| from_document(SLICE_INDEX, &doc.id, doc.data))
            .collect()
    }

    // ========== 索引状态 ==========

    pub async fn set_index_status(&self, status: &LongitudinalIndexStatus) -> Result<()> {
        let mut status = status.clone();
        status.updated_at = Utc::now();
        self.store
            .set(INDEX_STATUS, &status.study_id, to_document(&status)?)
            .await
    }

    /// 批量读取索引状态，没有状态文档的检查不出现在结果中
    pub async fn get_index_statuses(
        &self,
        study_ids: &[String],
    ) -> Result<HashMap<String, LongitudinalIndexStatus>> {
        let mut result = HashMap::with_capacity(study_ids.len());
        for id in study_ids {
            let id = id.trim();
            if id.is_empty() || result.contains_key(id) {
                continue;
            }
            if let Some(doc) = self.store.get(INDEX_STATUS, id).await? {
                let status: LongitudinalIndexStatus = from_document(INDEX_STATUS, id, doc)?;
                result.insert(id.to_string(), status);
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Duration;
    use vizor_core::{CreatorRole, IndexStatus, SessionStatus};

    fn queries() -> (Arc<MemoryStore>, DatabaseQueries) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), DatabaseQueries::new(store))
    }

    fn study(id: &str, user: &str, uid: &str) -> Study {
        Study {
            study_id: id.to_string(),
            user_id: user.to_string(),
            session_id: "SESS-1".to_string(),
            study_instance_uid: uid.to_string(),
            series_instance_uids: vec!["1.1".to_string()],
            modalities_in_study: vec!["CT".to_string()],
            study_date: "20240101".to_string(),
            study_description: "CHEST".to_string(),
            num_instances: 3,
            source_location: "gs://vault/u/s/".to_string(),
            dicom_store_path: "projects/p/locations/l/datasets/d/dicomStores/s".to_string(),
            created_at: Utc::now(),
        }
    }

    fn slice(study_id: &str, sop: &str, instance_number: i32, frame: &str) -> IndexedSlice {
        IndexedSlice {
            study_id: study_id.to_string(),
            patient_user_id: "user-1".to_string(),
            study_instance_uid: "1.2".to_string(),
            series_instance_uid: "1.2.1".to_string(),
            sop_instance_uid: sop.to_string(),
            instance_number,
            frame_of_reference_uid: frame.to_string(),
            image_position: [0.0, 0.0, instance_number as f64],
            row_direction: [1.0, 0.0, 0.0],
            column_direction: [0.0, 1.0, 0.0],
            pixel_spacing: [1.0, 1.0],
            normal: [0.0, 0.0, 1.0],
            plane_offset: instance_number as f64,
            study_date: "20240101".to_string(),
            acquisition_time: String::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upload_session_merge_update() {
        let (_, db) = queries();
        let session = UploadSession::new("SESS-1", "user-1", CreatorRole::Provider);
        db.create_upload_session(&session).await.unwrap();

        db.update_upload_session("SESS-1", &SessionUpdate::failed("boom"))
            .await
            .unwrap();
        let loaded = db.get_upload_session("SESS-1").await.unwrap().unwrap();
        assert_eq!(loaded.status, SessionStatus::Error);
        assert_eq!(loaded.error_message, "boom");
        assert_eq!(loaded.user_id, "user-1");
        assert!(loaded.updated_at >= session.updated_at);

        assert!(db.get_upload_session("SESS-404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_studies_by_user_newest_first() {
        let (_, db) = queries();
        let mut older = study("STUDY-A", "user-1", "1.1");
        older.created_at = Utc::now() - Duration::days(1);
        db.create_study(&older).await.unwrap();
        db.create_study(&study("STUDY-B", "user-1", "1.2")).await.unwrap();
        db.create_study(&study("STUDY-C", "user-2", "1.3")).await.unwrap();

        let ids: Vec<_> = db
            .list_studies_by_user("user-1")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.study_id)
            .collect();
        assert_eq!(ids, vec!["STUDY-B", "STUDY-A"]);

        let found = db.get_study_by_instance_uid("user-1", "1.2").await.unwrap();
        assert_eq!(found.map(|s| s.study_id), Some("STUDY-B".to_string()));
        assert!(db.get_study_by_instance_uid("user-1", "1.3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replace_slices_in_batches() {
        let (store, db) = queries();
        let first: Vec<_> = (0..450).map(|i| slice("STUDY-A", &format!("sop-{}", i), i, "F1")).collect();
        db.replace_indexed_slices("STUDY-A", &first).await.unwrap();
        db.replace_indexed_slices("STUDY-B", &[slice("STUDY-B", "other", 1, "F1")])
            .await
            .unwrap();
        assert_eq!(store.count(SLICE_INDEX).await, 451);

        let second: Vec<_> = (0..3).map(|i| slice("STUDY-A", &format!("sop-{}", i), i, "F1")).collect();
        assert_eq!(db.replace_indexed_slices("STUDY-A", &second).await.unwrap(), 3);
        assert_eq!(store.count(SLICE_INDEX).await, 4);
    }

    #[tokio::test]
    async fn test_list_slices_by_frame() {
        let (_, db) = queries();
        let slices = vec![
            slice("STUDY-A", "s3", 3, "F1"),
            slice("STUDY-A", "s1", 1, "F1"),
            slice("STUDY-A", "s2", 2, "F2"),
        ];
        db.replace_indexed_slices("STUDY-A", &slices).await.unwrap();

        let found = db.list_indexed_slices("STUDY-A", "F1").await.unwrap();
        let sops: Vec<_> = found.iter().map(|s| s.sop_instance_uid.as_str()).collect();
        assert_eq!(sops, vec!["s1", "s3"]);
        assert!(db.list_indexed_slices("STUDY-A", "F9").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_index_statuses_skip_missing() {
        let (_, db) = queries();
        let s = study("STUDY-A", "user-1", "1.1");
        db.set_index_status(&LongitudinalIndexStatus::new(&s, IndexStatus::Indexed, ""))
            .await
            .unwrap();

        let ids = vec!["STUDY-A".to_string(), "STUDY-B".to_string(), " ".to_string()];
        let statuses = db.get_index_statuses(&ids).await.unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses["STUDY-A"].status, IndexStatus::Indexed);
    }
}
