//! 上传源位置

use std::fmt;
use std::str::FromStr;
use vizor_core::{Result, VizorError};

const SCHEME: &str = "gs://";

/// 存储桶内的一个"目录"前缀，例如 `gs://vv-storage-vault/<userId>/<sessionId>/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    bucket: String,
    /// 不含首尾斜杠
    prefix: String,
}

impl SourceLocation {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let rest = trimmed.strip_prefix(SCHEME).ok_or_else(|| {
            VizorError::Validation(format!("源位置必须以 gs:// 开头: {:?}", raw))
        })?;

        let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(VizorError::Validation(format!("源位置缺少存储桶: {:?}", raw)));
        }
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            return Err(VizorError::Validation(format!("源位置缺少对象前缀: {:?}", raw)));
        }

        Ok(Self {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// 托管存储批量导入使用的通配URI，匹配前缀下所有层级的对象
    pub fn import_uri(&self) -> String {
        format!("{}{}/{}/**", SCHEME, self.bucket, self.prefix)
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}/", SCHEME, self.bucket, self.prefix)
    }
}

impl FromStr for SourceLocation {
    type Err = VizorError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
