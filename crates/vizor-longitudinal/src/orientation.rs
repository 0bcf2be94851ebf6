//! 序列方向一致性过滤
//!
//! 同一序列中方向与多数实例不同的实例会被剔除，避免混合方向污染几何结果。

use std::collections::HashMap;
use tracing::{debug, warn};
use vizor_dicom::{tags, DicomJsonDataset};

/// 指纹中每个分量保留的小数位
const FINGERPRINT_DECIMALS: i32 = 4;

/// 由 ImageOrientationPatient 的6个分量生成方向指纹，标签缺失或残缺时为 `None`
pub fn orientation_fingerprint(dataset: &DicomJsonDataset) -> Option<String> {
    let iop = dataset.floats(tags::IMAGE_ORIENTATION_PATIENT, 6)?;
    let scale = 10f64.powi(FINGERPRINT_DECIMALS);
    let parts: Vec<String> = iop
        .iter()
        .map(|v| {
            let rounded = (v * scale).round() / scale;
            // -0.0 与 0.0 视为同一方向
            let rounded = if rounded == 0.0 { 0.0 } else { rounded };
            format!("{:.*}", FINGERPRINT_DECIMALS as usize, rounded)
        })
        .collect();
    Some(parts.join(","))
}

/// 出现次数最多的指纹；次数相同时先出现者胜出
pub fn dominant_fingerprint<'a>(fingerprints: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for fp in fingerprints {
        let count = counts.entry(fp).or_insert(0);
        if *count == 0 {
            order.push(fp);
        }
        *count += 1;
    }

    let mut best: Option<(&str, usize)> = None;
    for fp in order {
        let count = counts[fp];
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((fp, count));
        }
    }
    best.map(|(fp, _)| fp.to_string())
}

/// 在一组实例内投票，把方向与多数不同的实例标记为剔除
fn mark_outliers(datasets: &[DicomJsonDataset], members: &[usize], keep: &mut [bool]) {
    let fingerprints: Vec<Option<String>> = members
        .iter()
        .map(|&i| orientation_fingerprint(&datasets[i]))
        .collect();
    let Some(dominant) = dominant_fingerprint(fingerprints.iter().flatten().map(String::as_str)) else {
        return;
    };
    debug!("Dominant orientation {} among {} instances", dominant, members.len());

    for (&i, fp) in members.iter().zip(&fingerprints) {
        if fp.as_ref().is_some_and(|fp| *fp != dominant) {
            keep[i] = false;
        }
    }
}

fn retain_marked(datasets: Vec<DicomJsonDataset>, groups: &[Vec<usize>]) -> Vec<DicomJsonDataset> {
    let mut keep = vec![true; datasets.len()];
    for members in groups {
        mark_outliers(&datasets, members, &mut keep);
    }

    let dropped = keep.iter().filter(|k| !**k).count();
    if dropped > 0 {
        warn!(
            "Dropped {} of {} instances with non-dominant orientation",
            dropped,
            datasets.len()
        );
    }
    datasets
        .into_iter()
        .zip(keep)
        .filter_map(|(ds, keep)| keep.then_some(ds))
        .collect()
}

/// 把全部实例视为同一序列过滤，保持原有顺序
pub fn filter_series(datasets: Vec<DicomJsonDataset>) -> Vec<DicomJsonDataset> {
    let all: Vec<usize> = (0..datasets.len()).collect();
    retain_marked(datasets, &[all])
}

/// 按 SeriesInstanceUID 分组逐序列过滤，保持原有顺序
pub fn filter_by_series(datasets: Vec<DicomJsonDataset>) -> Vec<DicomJsonDataset> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut group_of: HashMap<String, usize> = HashMap::new();
    for (i, ds) in datasets.iter().enumerate() {
        let series = ds.string(tags::SERIES_INSTANCE_UID);
        let group = *group_of.entry(series).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[group].push(i);
    }
    retain_marked(datasets, &groups)
}
