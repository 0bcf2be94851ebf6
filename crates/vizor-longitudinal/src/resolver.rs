//! 点定位
//!
//! 在同一参考坐标系的切片中找出离给定点最近的平面，并投影到该切片的像素网格。

use crate::geometry::{distance_to_plane, project_to_slice, Vec3};
use std::cmp::Ordering;
use vizor_core::{IndexedSlice, PointMatch};

/// 距离最小的切片；距离相同时按 (InstanceNumber, SOPInstanceUID) 取最小者
///
/// 距离不是有限值的切片不参与比较。
pub fn nearest_slice(slices: &[IndexedSlice], point: Vec3) -> Option<(&IndexedSlice, f64)> {
    slices
        .iter()
        .map(|slice| (slice, distance_to_plane(slice, point)))
        .filter(|(_, distance)| distance.is_finite())
        .min_by(|(a, da), (b, db)| {
            da.partial_cmp(db)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.instance_number.cmp(&b.instance_number))
                .then_with(|| a.sop_instance_uid.cmp(&b.sop_instance_uid))
        })
}

/// 单个检查内的定位结果；没有切片时为 `None`
pub fn resolve_in_study(
    study_id: &str,
    study_instance_uid: &str,
    slices: &[IndexedSlice],
    point: Vec3,
) -> Option<PointMatch> {
    let (slice, distance) = nearest_slice(slices, point)?;
    let (row, col) = project_to_slice(slice, point);
    Some(PointMatch {
        study_id: study_id.to_string(),
        study_instance_uid: study_instance_uid.to_string(),
        series_instance_uid: slice.series_instance_uid.clone(),
        sop_instance_uid: slice.sop_instance_uid.clone(),
        instance_number: slice.instance_number,
        row,
        col,
        distance,
    })
}
