//! 对象枚举与读取

use crate::location::SourceLocation;
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::path::Path;
use object_store::ObjectStore;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use vizor_core::{Result, VizorError};

/// 列举得到的对象
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    /// 桶内完整对象名
    pub name: String,
    pub size: u64,
}

/// 对象存储枚举接口
#[async_trait]
pub trait ObjectSource: Send + Sync {
    /// 按对象名字典序列出前缀下的全部对象
    async fn list(&self, location: &SourceLocation) -> Result<Vec<ObjectEntry>>;

    /// 读取单个对象的全部字节
    async fn read(&self, bucket: &str, name: &str) -> Result<Bytes>;
}

/// 基于 `object_store` 的实现，每个存储桶对应一个后端实例
#[derive(Clone, Default)]
pub struct ObjectStoreSource {
    stores: HashMap<String, Arc<dyn ObjectStore>>,
}

impl ObjectStoreSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册存储桶后端
    pub fn with_bucket(mut self, bucket: &str, store: Arc<dyn ObjectStore>) -> Self {
        self.stores.insert(bucket.to_string(), store);
        self
    }

    /// 为给定存储桶创建GCS后端，凭据取自环境变量
    pub fn gcs(buckets: &[&str]) -> Result<Self> {
        let mut source = Self::new();
        for bucket in buckets {
            let store = GoogleCloudStorageBuilder::from_env()
                .with_bucket_name(*bucket)
                .build()
                .map_err(|e| VizorError::Config(format!("无法创建GCS客户端 {}: {}", bucket, e)))?;
            info!("Registered GCS bucket: {}", bucket);
            source = source.with_bucket(bucket, Arc::new(store));
        }
        Ok(source)
    }

    fn store(&self, bucket: &str) -> Result<&Arc<dyn ObjectStore>> {
        self.stores
            .get(bucket)
            .ok_or_else(|| VizorError::Storage(format!("未配置的存储桶: {}", bucket)))
    }
}

#[async_trait]
impl ObjectSource for ObjectStoreSource {
    async fn list(&self, location: &SourceLocation) -> Result<Vec<ObjectEntry>> {
        let store = self.store(location.bucket())?;
        let prefix = Path::from(location.prefix());

        let metas: Vec<_> = store
            .list(Some(&prefix))
            .try_collect()
            .await
            .map_err(|e| VizorError::Upstream(format!("列举 {} 下的对象失败: {}", location, e)))?;

        let mut entries: Vec<ObjectEntry> = metas
            .into_iter()
            .map(|meta| ObjectEntry {
                name: meta.location.to_string(),
                size: meta.size as u64,
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        debug!("Listed {} objects under {}", entries.len(), location);
        Ok(entries)
    }

    async fn read(&self, bucket: &str, name: &str) -> Result<Bytes> {
        let store = self.store(bucket)?;
        let path = Path::from(name);
        let result = store
            .get(&path)
            .await
            .map_err(|e| VizorError::Storage(format!("读取 gs://{}/{} 失败: {}", bucket, name, e)))?;
        result
            .bytes()
            .await
            .map_err(|e| VizorError::Storage(format!("读取 gs://{}/{} 失败: {}", bucket, name, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;

    async fn source_with(objects: &[(&str, &[u8])]) -> ObjectStoreSource {
        let store = InMemory::new();
        for (name, data) in objects {
            store
                .put(&Path::from(*name), Bytes::copy_from_slice(data))
                .await
                .unwrap();
        }
        ObjectStoreSource::new().with_bucket("vault", Arc::new(store))
    }

    #[tokio::test]
    async fn test_list_is_scoped_and_sorted() {
        let source = source_with(&[
            ("u1/s1/b.dcm", b"bb"),
            ("u1/s1/a.dcm", b"a"),
            ("u1/s1/nested/c", b"ccc"),
            ("u1/s2/other.dcm", b"x"),
        ])
        .await;

        let loc = SourceLocation::parse("gs://vault/u1/s1/").unwrap();
        let entries = source.list(&loc).await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["u1/s1/a.dcm", "u1/s1/b.dcm", "u1/s1/nested/c"]);
        assert_eq!(entries[2].size, 3);
    }

    #[tokio::test]
    async fn test_read_object() {
        let source = source_with(&[("u1/s1/a.dcm", b"hello")]).await;
        let data = source.read("vault", "u1/s1/a.dcm").await.unwrap();
        assert_eq!(&data[..], b"hello");
        assert!(source.read("vault", "u1/s1/missing.dcm").await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_bucket() {
        let source = source_with(&[]).await;
        let loc = SourceLocation::parse("gs://elsewhere/u1/s1/").unwrap();
        assert!(matches!(source.list(&loc).await, Err(VizorError::Storage(_))));
    }
}
