//! 切片几何
//!
//! 平面方程 normal · x = plane_offset，其中 normal = rowDir × colDir（不做归一化）。
//! 距离与投影都使用同一个未归一化的法向量。

use crate::orientation::filter_by_series;
use chrono::Utc;
use tracing::{debug, info};
use vizor_core::{IndexedSlice, Study};
use vizor_dicom::{tags, DicomJsonDataset};

pub type Vec3 = [f64; 3];

pub fn dot(a: Vec3, b: Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

pub fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

/// 点到切片平面的距离（与坐标同单位，通常为毫米）
pub fn distance_to_plane(slice: &IndexedSlice, point: Vec3) -> f64 {
    (dot(slice.normal, point) - slice.plane_offset).abs()
}

/// 点在切片像素网格上的 (row, col)，不做边界裁剪
pub fn project_to_slice(slice: &IndexedSlice, point: Vec3) -> (f64, f64) {
    let v = sub(point, slice.image_position);
    let [row_spacing, col_spacing] = slice.pixel_spacing;
    let row = if row_spacing != 0.0 {
        dot(v, slice.row_direction) / row_spacing
    } else {
        0.0
    };
    let col = if col_spacing != 0.0 {
        dot(v, slice.column_direction) / col_spacing
    } else {
        0.0
    };
    (row, col)
}

/// 由单个实例的 DICOM JSON 计算切片；缺少位置、方向或像素间距时返回 `None`
pub fn slice_from_dataset(study: &Study, dataset: &DicomJsonDataset) -> Option<IndexedSlice> {
    let series_uid = dataset.string(tags::SERIES_INSTANCE_UID);
    let sop_uid = dataset.string(tags::SOP_INSTANCE_UID);
    if series_uid.is_empty() || sop_uid.is_empty() {
        return None;
    }

    let ipp = dataset.floats(tags::IMAGE_POSITION_PATIENT, 3)?;
    let iop = dataset.floats(tags::IMAGE_ORIENTATION_PATIENT, 6)?;
    let spacing = dataset.floats(tags::PIXEL_SPACING, 2)?;

    let image_position = [ipp[0], ipp[1], ipp[2]];
    let row_direction = [iop[0], iop[1], iop[2]];
    let column_direction = [iop[3], iop[4], iop[5]];
    let normal = cross(row_direction, column_direction);
    let plane_offset = dot(normal, image_position);
    // 极端输入在叉积/点积中溢出时，平面无法序列化也无法比较
    if !normal.iter().all(|v| v.is_finite()) || !plane_offset.is_finite() {
        return None;
    }

    Some(IndexedSlice {
        study_id: study.study_id.clone(),
        patient_user_id: study.user_id.clone(),
        study_instance_uid: study.study_instance_uid.clone(),
        series_instance_uid: series_uid,
        sop_instance_uid: sop_uid,
        instance_number: dataset.integer(tags::INSTANCE_NUMBER).unwrap_or(0),
        frame_of_reference_uid: dataset.string(tags::FRAME_OF_REFERENCE_UID),
        image_position,
        row_direction,
        column_direction,
        pixel_spacing: [spacing[0], spacing[1]],
        normal,
        plane_offset,
        study_date: study.study_date.clone(),
        acquisition_time: dataset.string(tags::ACQUISITION_TIME),
        created_at: Utc::now(),
    })
}

/// 方向过滤后为检查的每个可用实例生成切片
pub fn build_indexed_slices(study: &Study, datasets: Vec<DicomJsonDataset>) -> Vec<IndexedSlice> {
    let total = datasets.len();
    let survivors = filter_by_series(datasets);
    let filtered = survivors.len();

    let slices: Vec<IndexedSlice> = survivors
        .iter()
        .filter_map(|ds| {
            let slice = slice_from_dataset(study, ds);
            if slice.is_none() {
                debug!(
                    "Instance {:?} of study {} lacks geometry, skipped",
                    ds.string(tags::SOP_INSTANCE_UID),
                    study.study_id
                );
            }
            slice
        })
        .collect();

    info!(
        "Study {}: {} instances, {} after orientation filter, {} indexable",
        study.study_id,
        total,
        filtered,
        slices.len()
    );
    slices
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use serde_json::{json, Value};

    pub fn study(study_id: &str, user_id: &str, uid: &str) -> Study {
        Study {
            study_id: study_id.to_string(),
            user_id: user_id.to_string(),
            session_id: "SESS-1".to_string(),
            study_instance_uid: uid.to_string(),
            series_instance_uids: vec![format!("{}.1", uid)],
            modalities_in_study: vec!["CT".to_string()],
            study_date: "20240105".to_string(),
            study_description: "CT CHEST".to_string(),
            num_instances: 0,
            source_location: "gs://vault/u/s/".to_string(),
            dicom_store_path: "stores/s".to_string(),
            created_at: Utc::now(),
        }
    }

    fn values(v: &[f64]) -> Vec<Value> {
        v.iter().map(|x| json!(x)).collect()
    }

    /// 轴位切片：行方向 +x，列方向 +y，位于 z
    pub fn axial(series: &str, sop: &str, number: i32, z: f64, frame: &str) -> DicomJsonDataset {
        DicomJsonDataset::new()
            .with(tags::SERIES_INSTANCE_UID, "UI", vec![json!(series)])
            .with(tags::SOP_INSTANCE_UID, "UI", vec![json!(sop)])
            .with(tags::INSTANCE_NUMBER, "IS", vec![json!(number)])
            .with(tags::FRAME_OF_REFERENCE_UID, "UI", vec![json!(frame)])
            .with(tags::IMAGE_POSITION_PATIENT, "DS", values(&[0.0, 0.0, z]))
            .with(tags::IMAGE_ORIENTATION_PATIENT, "DS", values(&[1.0, 0.0, 0.0, 0.0, 1.0, 0.0]))
            .with(tags::PIXEL_SPACING, "DS", values(&[0.5, 0.5]))
            .with(tags::ACQUISITION_TIME, "TM", vec![json!("101500")])
    }
}
