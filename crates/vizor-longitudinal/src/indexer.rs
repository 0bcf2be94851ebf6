//! 纵向索引服务
//!
//! 对外提供三个操作：为检查建立切片索引、查询索引状态、跨检查定位解剖点。
//! 三者都只作用于调用者本人拥有的检查。

use crate::geometry::{build_indexed_slices, Vec3};
use crate::resolver::resolve_in_study;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use vizor_core::{IndexStatus, LongitudinalIndexStatus, PointMatch, Result, Study, VizorError};
use vizor_database::DatabaseQueries;
use vizor_integration::ManagedDicomStore;

pub struct LongitudinalIndexer {
    queries: DatabaseQueries,
    dicom_store: Arc<dyn ManagedDicomStore>,
}

impl LongitudinalIndexer {
    pub fn new(queries: DatabaseQueries, dicom_store: Arc<dyn ManagedDicomStore>) -> Self {
        Self {
            queries,
            dicom_store,
        }
    }

    /// 重建检查的切片索引，返回写入的切片数
    ///
    /// 状态依次写为 `indexing`，再写为 `indexed` 或 `error`。没有可用切片时
    /// 返回 `NoData`，已有索引保持不变。
    pub async fn trigger_indexing(&self, caller: &str, study_id: &str) -> Result<usize> {
        let caller = require("caller", caller)?;
        let study_id = require("study_id", study_id)?;

        let study = self
            .queries
            .get_study(study_id)
            .await?
            .filter(|study| study.user_id == caller)
            .ok_or_else(|| VizorError::NotFound(format!("检查 {} 不存在", study_id)))?;

        self.queries
            .set_index_status(&LongitudinalIndexStatus::new(&study, IndexStatus::Indexing, ""))
            .await?;
        info!("Indexing study {} ({})", study.study_id, study.study_instance_uid);

        match self.build_and_replace(&study).await {
            Ok(count) => {
                self.queries
                    .set_index_status(&LongitudinalIndexStatus::new(&study, IndexStatus::Indexed, ""))
                    .await?;
                info!("Study {} indexed with {} slices", study.study_id, count);
                Ok(count)
            }
            Err(e) => {
                error!("Indexing of study {} failed: {}", study.study_id, e);
                let status = LongitudinalIndexStatus::new(&study, IndexStatus::Error, e.detail());
                if let Err(write_err) = self.queries.set_index_status(&status).await {
                    error!(
                        "Failed to record index error for study {}: {}",
                        study.study_id, write_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn build_and_replace(&self, study: &Study) -> Result<usize> {
        let datasets = self
            .dicom_store
            .study_metadata(&study.study_instance_uid)
            .await?;
        let slices = build_indexed_slices(study, datasets);
        if slices.is_empty() {
            return Err(VizorError::NoData(format!(
                "检查 {} 没有可索引的切片",
                study.study_id
            )));
        }
        self.queries
            .replace_indexed_slices(&study.study_id, &slices)
            .await
    }

    /// 调用者拥有的检查的索引状态；从未索引过的检查报告为 `not_indexed`
    pub async fn index_statuses(
        &self,
        caller: &str,
        study_ids: &[String],
    ) -> Result<HashMap<String, LongitudinalIndexStatus>> {
        let caller = require("caller", caller)?;
        let owned = self.owned_studies(caller, study_ids).await?;
        let ids: Vec<String> = owned.iter().map(|s| s.study_id.clone()).collect();

        let mut statuses = self.queries.get_index_statuses(&ids).await?;
        for study in &owned {
            statuses
                .entry(study.study_id.clone())
                .or_insert_with(|| LongitudinalIndexStatus::new(study, IndexStatus::NotIndexed, ""));
        }
        Ok(statuses)
    }

    /// 在每个检查中定位离点最近的切片
    ///
    /// 结果顺序与输入一致；无权访问、不存在或在该坐标系下没有切片的检查不出现在结果中。
    pub async fn resolve_point(
        &self,
        caller: &str,
        frame_of_reference_uid: &str,
        point: Vec3,
        study_ids: &[String],
    ) -> Result<Vec<PointMatch>> {
        let caller = require("caller", caller)?;
        let frame = require("frame_of_reference_uid", frame_of_reference_uid)?;
        if study_ids.is_empty() {
            return Err(VizorError::Validation("study_ids 不能为空".to_string()));
        }

        let mut matches = Vec::new();
        for study in self.owned_studies(caller, study_ids).await? {
            let slices = self.queries.list_indexed_slices(&study.study_id, frame).await?;
            match resolve_in_study(&study.study_id, &study.study_instance_uid, &slices, point) {
                Some(m) => matches.push(m),
                None => debug!("Study {} has no slices in frame {}", study.study_id, frame),
            }
        }
        info!(
            "Resolved point {:?} in frame {}: {} of {} studies matched",
            point,
            frame,
            matches.len(),
            study_ids.len()
        );
        Ok(matches)
    }

    /// 去重后调用者拥有的检查，保持输入顺序
    async fn owned_studies(&self, caller: &str, study_ids: &[String]) -> Result<Vec<Study>> {
        let mut seen = HashSet::new();
        let mut owned = Vec::new();
        for id in study_ids {
            let id = id.trim();
            if id.is_empty() || !seen.insert(id) {
                continue;
            }
            match self.queries.get_study(id).await? {
                Some(study) if study.user_id == caller => owned.push(study),
                Some(_) => warn!("Caller {} does not own study {}, skipped", caller, id),
                None => debug!("Study {} not found, skipped", id),
            }
        }
        Ok(owned)
    }
}

fn require<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(VizorError::Validation(format!("{} 不能为空", field)));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::test_support::{axial, study};
    use chrono::{TimeZone, Utc};
    use vizor_core::{ErrorKind, IndexedSlice};
    use vizor_database::MemoryStore;
    use vizor_dicom::{tags, DicomJsonDataset};
    use vizor_integration::InMemoryDicomStore;

    struct Harness {
        queries: DatabaseQueries,
        dicom: Arc<InMemoryDicomStore>,
        indexer: LongitudinalIndexer,
    }

    impl Harness {
        fn new() -> Self {
            let queries = DatabaseQueries::new(Arc::new(MemoryStore::new()));
            let dicom = Arc::new(InMemoryDicomStore::new("stores/s"));
            let indexer = LongitudinalIndexer::new(queries.clone(), dicom.clone());
            Self {
                queries,
                dicom,
                indexer,
            }
        }

        /// 新建检查并放入 z = 0, 10, .. 的轴位切片
        async fn add_study(&self, study_id: &str, owner: &str, uid: &str, slices: usize) -> Study {
            let study = study(study_id, owner, uid);
            self.queries.create_study(&study).await.unwrap();
            let datasets = (0..slices)
                .map(|i| {
                    axial(
                        &format!("{}.1", uid),
                        &format!("{}.{}", uid, i),
                        i as i32 + 1,
                        i as f64 * 10.0,
                        "F1",
                    )
                })
                .collect();
            self.dicom.put_study(uid, datasets).await;
            study
        }

        async fn status(&self, study_id: &str) -> LongitudinalIndexStatus {
            let ids = vec![study_id.to_string()];
            self.queries.get_index_statuses(&ids).await.unwrap().remove(study_id).unwrap()
        }
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn without_timestamps(mut slices: Vec<IndexedSlice>) -> Vec<IndexedSlice> {
        let epoch = Utc.timestamp_opt(0, 0).unwrap();
        for slice in &mut slices {
            slice.created_at = epoch;
        }
        slices
    }

    #[tokio::test]
    async fn test_index_then_resolve_two_studies() {
        let h = Harness::new();
        h.add_study("STUDY-A", "user-1", "1.1", 5).await;
        h.add_study("STUDY-B", "user-1", "2.2", 5).await;

        assert_eq!(h.indexer.trigger_indexing("user-1", "STUDY-A").await.unwrap(), 5);
        assert_eq!(h.indexer.trigger_indexing("user-1", "STUDY-B").await.unwrap(), 5);
        assert_eq!(h.status("STUDY-A").await.status, IndexStatus::Indexed);

        let matches = h
            .indexer
            .resolve_point("user-1", "F1", [0.0, 0.0, 0.0], &ids(&["STUDY-A", "STUDY-B"]))
            .await
            .unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].study_id, "STUDY-A");
        assert_eq!(matches[0].sop_instance_uid, "1.1.0");
        assert_eq!(matches[1].study_id, "STUDY-B");
        assert_eq!(matches[1].sop_instance_uid, "2.2.0");
        assert!(matches.iter().all(|m| m.distance == 0.0));
    }

    #[tokio::test]
    async fn test_reindex_is_idempotent() {
        let h = Harness::new();
        h.add_study("STUDY-A", "user-1", "1.1", 7).await;

        h.indexer.trigger_indexing("user-1", "STUDY-A").await.unwrap();
        let first = h.queries.list_indexed_slices("STUDY-A", "F1").await.unwrap();
        h.indexer.trigger_indexing("user-1", "STUDY-A").await.unwrap();
        let second = h.queries.list_indexed_slices("STUDY-A", "F1").await.unwrap();

        assert_eq!(second.len(), 7);
        assert_eq!(without_timestamps(first), without_timestamps(second));
    }

    #[tokio::test]
    async fn test_zero_slices_keeps_prior_index() {
        let h = Harness::new();
        h.add_study("STUDY-A", "user-1", "1.1", 3).await;
        h.indexer.trigger_indexing("user-1", "STUDY-A").await.unwrap();

        let no_spacing = DicomJsonDataset::new()
            .with(tags::SERIES_INSTANCE_UID, "UI", vec!["1.1.1".into()])
            .with(tags::SOP_INSTANCE_UID, "UI", vec!["1.1.9".into()]);
        h.dicom.put_study("1.1", vec![no_spacing]).await;

        let err = h.indexer.trigger_indexing("user-1", "STUDY-A").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoData);

        let status = h.status("STUDY-A").await;
        assert_eq!(status.status, IndexStatus::Error);
        assert_eq!(status.last_error, err.detail());
        assert_eq!(h.queries.list_indexed_slices("STUDY-A", "F1").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_metadata_failure_recorded() {
        let h = Harness::new();
        let study = study("STUDY-A", "user-1", "9.9");
        h.queries.create_study(&study).await.unwrap();

        assert!(h.indexer.trigger_indexing("user-1", "STUDY-A").await.is_err());
        let status = h.status("STUDY-A").await;
        assert_eq!(status.status, IndexStatus::Error);
        assert!(!status.last_error.is_empty());
    }

    #[tokio::test]
    async fn test_ownership_enforced() {
        let h = Harness::new();
        h.add_study("STUDY-A", "user-1", "1.1", 2).await;
        h.add_study("STUDY-X", "user-2", "3.3", 2).await;
        h.indexer.trigger_indexing("user-2", "STUDY-X").await.unwrap();

        let err = h.indexer.trigger_indexing("user-1", "STUDY-X").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = h.indexer.trigger_indexing("user-1", "STUDY-NOPE").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let statuses = h
            .indexer
            .index_statuses("user-1", &ids(&["STUDY-A", "STUDY-X", "STUDY-NOPE", " "]))
            .await
            .unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses["STUDY-A"].status, IndexStatus::NotIndexed);
        assert_eq!(statuses["STUDY-A"].patient_user_id, "user-1");

        let matches = h
            .indexer
            .resolve_point("user-1", "F1", [0.0, 0.0, 0.0], &ids(&["STUDY-X"]))
            .await
            .unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn test_overflowing_instance_does_not_break_resolve() {
        let h = Harness::new();
        let study = study("STUDY-A", "user-1", "1.1");
        h.queries.create_study(&study).await.unwrap();
        let huge = axial("1.1.2", "1.1.bad", 2, 0.0, "F1").with(
            tags::IMAGE_ORIENTATION_PATIENT,
            "DS",
            vec![1e200.into(), 1e200.into(), 0.0.into(), 1e200.into(), (-1e200).into(), 0.0.into()],
        );
        h.dicom
            .put_study("1.1", vec![axial("1.1.1", "1.1.good", 1, 0.0, "F1"), huge])
            .await;

        assert_eq!(h.indexer.trigger_indexing("user-1", "STUDY-A").await.unwrap(), 1);
        let matches = h
            .indexer
            .resolve_point("user-1", "F1", [0.0, 0.0, 0.0], &ids(&["STUDY-A"]))
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].sop_instance_uid, "1.1.good");
    }

    #[tokio::test]
    async fn test_missing_frame_never_matched() {
        let h = Harness::new();
        let study = study("STUDY-A", "user-1", "1.1");
        h.queries.create_study(&study).await.unwrap();
        let no_frame = axial("1.1.1", "1.1.0", 1, 0.0, "F1").with(tags::FRAME_OF_REFERENCE_UID, "UI", vec![]);
        h.dicom.put_study("1.1", vec![no_frame]).await;

        assert_eq!(h.indexer.trigger_indexing("user-1", "STUDY-A").await.unwrap(), 1);
        let matches = h
            .indexer
            .resolve_point("user-1", "F1", [0.0, 0.0, 0.0], &ids(&["STUDY-A"]))
            .await
            .unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_validation() {
        let h = Harness::new();
        let point = [0.0, 0.0, 0.0];
        for (caller, frame, studies) in [
            ("", "F1", ids(&["STUDY-A"])),
            ("user-1", "  ", ids(&["STUDY-A"])),
            ("user-1", "F1", Vec::new()),
        ] {
            let err = h.indexer.resolve_point(caller, frame, point, &studies).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
        let err = h.indexer.trigger_indexing("user-1", "").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
