//! DICOM文件头扫描
//!
//! 单个文件读取或解析失败只记录日志并跳过；列举失败则整体失败。

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use vizor_core::{InstanceHeader, Result};
use vizor_dicom::HeaderParser;
use vizor_storage::{ObjectSource, SourceLocation};

const DICOM_EXTENSIONS: &[&str] = &["dcm", "dicom"];

/// 按对象名判断是否可能是DICOM文件
///
/// 只看最后一个路径段：无扩展名或 `.dcm`/`.dicom` 视为候选，其余扩展名一律跳过。
pub fn looks_like_dicom(name: &str) -> bool {
    if name.is_empty() || name.ends_with('/') {
        return false;
    }
    let file_name = name.rsplit('/').next().unwrap_or(name).to_ascii_lowercase();
    match file_name.rsplit_once('.') {
        None => true,
        Some((_, ext)) => DICOM_EXTENSIONS.contains(&ext),
    }
}

/// 文件头扫描器
pub struct HeaderScanner {
    source: Arc<dyn ObjectSource>,
}

impl HeaderScanner {
    pub fn new(source: Arc<dyn ObjectSource>) -> Self {
        Self { source }
    }

    /// 扫描源位置下的全部对象，按 StudyInstanceUID 分组
    ///
    /// 组内实例保持对象名的字典序。
    pub async fn scan(&self, location: &SourceLocation) -> Result<BTreeMap<String, Vec<InstanceHeader>>> {
        let entries = self.source.list(location).await?;
        let total = entries.len();
        let mut studies: BTreeMap<String, Vec<InstanceHeader>> = BTreeMap::new();
        let mut accepted = 0usize;

        for entry in entries {
            if !looks_like_dicom(&entry.name) {
                debug!("Skipping non-DICOM object {}", entry.name);
                continue;
            }

            let data = match self.source.read(location.bucket(), &entry.name).await {
                Ok(data) => data,
                Err(e) => {
                    warn!("Failed to read {} ({} bytes): {}", entry.name, entry.size, e);
                    continue;
                }
            };

            let header = match HeaderParser::parse_bytes(&data) {
                Ok(header) => header,
                Err(e) => {
                    warn!("Failed to parse {}: {}", entry.name, e);
                    continue;
                }
            };

            if !header.is_usable() {
                debug!("{} has no Study/SOP Instance UID, skipped", entry.name);
                continue;
            }

            accepted += 1;
            studies
                .entry(header.study_instance_uid.clone())
                .or_default()
                .push(header);
        }

        info!(
            "Scanned {}: {} objects, {} instances in {} studies",
            location,
            total,
            accepted,
            studies.len()
        );
        Ok(studies)
    }
}
