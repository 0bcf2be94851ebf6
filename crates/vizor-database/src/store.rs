//! 文档存储接口
//!
//! 文档按 (集合, 文档ID) 寻址，内容为JSON对象。单文档写入是原子的，
//! 跨文档没有事务；`batch_write` 单次最多 [`MAX_BATCH_OPS`] 个操作。

use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use tokio::sync::RwLock;
use vizor_core::{Result, VizorError};

/// 单次批量写入的操作上限
pub const MAX_BATCH_OPS: usize = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Ascending,
    Descending,
}

/// 集合内查询：字段相等过滤，可选排序与条数限制
#[derive(Debug, Clone)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<(String, Value)>,
    pub order_by: Option<(String, OrderDirection)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn filter(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push((field.to_string(), value.into()));
        self
    }

    pub fn order_by(mut self, field: &str, direction: OrderDirection) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, data: &Value) -> bool {
        self.filters
            .iter()
            .all(|(field, expected)| data.get(field) == Some(expected))
    }
}

/// 查询结果中的一条文档
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub data: Value,
}

/// 批量写入中的单个操作
#[derive(Debug, Clone)]
pub enum BatchOp {
    Set {
        collection: String,
        id: String,
        data: Value,
    },
    Delete {
        collection: String,
        id: String,
    },
}

impl BatchOp {
    fn collection(&self) -> &str {
        match self {
            BatchOp::Set { collection, .. } | BatchOp::Delete { collection, .. } => collection,
        }
    }
}

/// 元数据存储接口
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// 读取文档，不存在时返回 `Ok(None)`
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>>;

    /// 整体替换文档
    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<()>;

    /// 将顶层字段合并进已有文档，文档不存在时创建
    async fn merge_set(&self, collection: &str, id: &str, data: Value) -> Result<()>;

    async fn query(&self, query: &Query) -> Result<Vec<StoredDocument>>;

    async fn batch_write(&self, ops: Vec<BatchOp>) -> Result<()>;
}

pub(crate) fn check_batch_size(ops: &[BatchOp]) -> Result<()> {
    if ops.len() > MAX_BATCH_OPS {
        return Err(VizorError::Validation(format!(
            "批量写入包含 {} 个操作，超过上限 {}",
            ops.len(),
            MAX_BATCH_OPS
        )));
    }
    Ok(())
}

/// 合并两个JSON对象的顶层字段，非对象时直接替换
pub(crate) fn merge_documents(existing: &mut Value, patch: Value) {
    match (existing.as_object_mut(), patch) {
        (Some(target), Value::Object(fields)) => {
            for (key, value) in fields {
                target.insert(key, value);
            }
        }
        (_, patch) => *existing = patch,
    }
}

/// 排序用的JSON值比较：缺失 < null < 布尔 < 数值 < 字符串
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None => 0,
            Some(Value::Null) => 1,
            Some(Value::Bool(_)) => 2,
            Some(Value::Number(_)) => 3,
            Some(Value::String(_)) => 4,
            Some(_) => 5,
        }
    }
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// 进程内文档存储，用于测试与未配置数据库的本地运行
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<BTreeMap<String, BTreeMap<String, Value>>>,
    unavailable: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 让指定集合的读写全部失败，用于模拟存储故障
    pub fn set_unavailable(&self, collection: &str, unavailable: bool) {
        if let Ok(mut set) = self.unavailable.lock() {
            if unavailable {
                set.insert(collection.to_string());
            } else {
                set.remove(collection);
            }
        }
    }

    /// 集合中的文档数
    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    fn check_available(&self, collection: &str) -> Result<()> {
        let down = self
            .unavailable
            .lock()
            .map(|set| set.contains(collection))
            .unwrap_or(false);
        if down {
            return Err(VizorError::Database(format!("集合 {} 不可用", collection)));
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        self.check_available(collection)?;
        let collections = self.collections.read().await;
        Ok(collections.get(collection).and_then(|docs| docs.get(id)).cloned())
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<()> {
        self.check_available(collection)?;
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
        Ok(())
    }

    async fn merge_set(&self, collection: &str, id: &str, data: Value) -> Result<()> {
        self.check_available(collection)?;
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        match docs.get_mut(id) {
            Some(existing) => merge_documents(existing, data),
            None => {
                docs.insert(id.to_string(), data);
            }
        }
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<StoredDocument>> {
        self.check_available(&query.collection)?;
        let collections = self.collections.read().await;
        let mut results: Vec<StoredDocument> = collections
            .get(&query.collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, data)| query.matches(data))
                    .map(|(id, data)| StoredDocument {
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        if let Some((field, direction)) = &query.order_by {
            results.sort_by(|a, b| {
                let ord = compare_values(a.data.get(field), b.data.get(field));
                match direction {
                    OrderDirection::Ascending => ord,
                    OrderDirection::Descending => ord.reverse(),
                }
            });
        }
        if let Some(limit) = query.limit {
            results.truncate(limit);
        }
        Ok(results)
    }

    async fn batch_write(&self, ops: Vec<BatchOp>) -> Result<()> {
        check_batch_size(&ops)?;
        for op in &ops {
            self.check_available(op.collection())?;
        }
        let mut collections = self.collections.write().await;
        for op in ops {
            match op {
                BatchOp::Set { collection, id, data } => {
                    collections.entry(collection).or_default().insert(id, data);
                }
                BatchOp::Delete { collection, id } => {
                    if let Some(docs) = collections.get_mut(&collection) {
                        docs.remove(&id);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = MemoryStore::new();
        assert_eq!(store.get("things", "nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_replaces_and_merge_keeps_fields() {
        let store = MemoryStore::new();
        store.set("s", "1", json!({"a": 1, "b": 2})).await.unwrap();
        store.set("s", "1", json!({"a": 3})).await.unwrap();
        assert_eq!(store.get("s", "1").await.unwrap(), Some(json!({"a": 3})));

        store.merge_set("s", "1", json!({"b": "x"})).await.unwrap();
        assert_eq!(store.get("s", "1").await.unwrap(), Some(json!({"a": 3, "b": "x"})));

        store.merge_set("s", "2", json!({"c": true})).await.unwrap();
        assert_eq!(store.get("s", "2").await.unwrap(), Some(json!({"c": true})));
    }

    #[tokio::test]
    async fn test_query_filter_order_limit() {
        let store = MemoryStore::new();
        store.set("q", "a", json!({"owner": "u1", "n": 3})).await.unwrap();
        store.set("q", "b", json!({"owner": "u1", "n": 1})).await.unwrap();
        store.set("q", "c", json!({"owner": "u2", "n": 2})).await.unwrap();
        store.set("q", "d", json!({"owner": "u1", "n": 2})).await.unwrap();

        let docs = store
            .query(&Query::new("q").filter("owner", "u1").order_by("n", OrderDirection::Ascending))
            .await
            .unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d", "a"]);

        let docs = store
            .query(
                &Query::new("q")
                    .filter("owner", "u1")
                    .order_by("n", OrderDirection::Descending)
                    .limit(1),
            )
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "a");
    }

    #[tokio::test]
    async fn test_batch_write_limit() {
        let store = MemoryStore::new();
        let ops: Vec<_> = (0..=MAX_BATCH_OPS)
            .map(|i| BatchOp::Set {
                collection: "b".to_string(),
                id: i.to_string(),
                data: json!({}),
            })
            .collect();
        assert!(matches!(store.batch_write(ops).await, Err(VizorError::Validation(_))));
        assert_eq!(store.count("b").await, 0);
    }

    #[tokio::test]
    async fn test_batch_set_and_delete() {
        let store = MemoryStore::new();
        store.set("b", "old", json!({})).await.unwrap();
        store
            .batch_write(vec![
                BatchOp::Delete {
                    collection: "b".to_string(),
                    id: "old".to_string(),
                },
                BatchOp::Set {
                    collection: "b".to_string(),
                    id: "new".to_string(),
                    data: json!({"k": 1}),
                },
            ])
            .await
            .unwrap();
        assert_eq!(store.get("b", "old").await.unwrap(), None);
        assert_eq!(store.count("b").await, 1);
    }

    #[tokio::test]
    async fn test_unavailable_collection() {
        let store = MemoryStore::new();
        store.set_unavailable("s", true);
        assert!(matches!(store.get("s", "1").await, Err(VizorError::Database(_))));
        store.set_unavailable("s", false);
        assert!(store.get("s", "1").await.is_ok());
    }
}
