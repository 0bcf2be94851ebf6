//! 检查汇总
//!
//! 把扫描得到的实例按 StudyInstanceUID 汇总为检查记录。

use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;
use vizor_core::utils::generate_token_id;
use vizor_core::{InstanceHeader, Result, Study, UploadSession, VizorError};
use vizor_database::DatabaseQueries;
use vizor_storage::SourceLocation;

pub struct StudyAssembler {
    queries: DatabaseQueries,
    dicom_store_path: String,
}

impl StudyAssembler {
    pub fn new(queries: DatabaseQueries, dicom_store_path: impl Into<String>) -> Self {
        Self {
            queries,
            dicom_store_path: dicom_store_path.into(),
        }
    }

    /// 每组生成一条检查；组为空时失败
    ///
    /// 序列与模态去重后排序，描述和日期取组内第一个非空值。
    pub fn assemble(
        &self,
        session: &UploadSession,
        location: &SourceLocation,
        groups: &BTreeMap<String, Vec<InstanceHeader>>,
    ) -> Result<Vec<Study>> {
        if groups.is_empty() {
            return Err(VizorError::NoStudiesDetected(format!(
                "在 {} 下未检测到DICOM检查",
                location
            )));
        }

        let now = Utc::now();
        let studies = groups
            .iter()
            .map(|(study_uid, instances)| {
                let mut series = BTreeSet::new();
                let mut modalities = BTreeSet::new();
                let mut study_date = "";
                let mut study_description = "";

                for inst in instances {
                    if !inst.series_instance_uid.is_empty() {
                        series.insert(inst.series_instance_uid.clone());
                    }
                    if !inst.modality.is_empty() {
                        modalities.insert(inst.modality.clone());
                    }
                    if study_date.is_empty() {
                        study_date = &inst.study_date;
                    }
                    if study_description.is_empty() {
                        study_description = &inst.study_description;
                    }
                }

                Study {
                    study_id: generate_token_id("STUDY"),
                    user_id: session.user_id.clone(),
                    session_id: session.session_id.clone(),
                    study_instance_uid: study_uid.clone(),
                    series_instance_uids: series.into_iter().collect(),
                    modalities_in_study: modalities.into_iter().collect(),
                    study_date: study_date.to_string(),
                    study_description: study_description.to_string(),
                    num_instances: instances.len(),
                    source_location: location.to_string(),
                    dicom_store_path: self.dicom_store_path.clone(),
                    created_at: now,
                }
            })
            .collect();
        Ok(studies)
    }

    /// 汇总并逐条写入检查记录
    pub async fn assemble_and_persist(
        &self,
        session: &UploadSession,
        location: &SourceLocation,
        groups: &BTreeMap<String, Vec<InstanceHeader>>,
    ) -> Result<Vec<Study>> {
        let studies = self.assemble(session, location, groups)?;
        for study in &studies {
            self.queries.create_study(study).await?;
        }
        info!(
            "Created {} studies for session {}",
            studies.len(),
            session.session_id
        );
        Ok(studies)
    }
}
