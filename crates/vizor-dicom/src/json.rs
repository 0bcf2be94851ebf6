//! DICOM JSON 数据集访问
//!
//! 托管存储的 metadata 接口返回以8位十六进制标签为键的对象，
//! 每个元素形如 `{"vr": "DS", "Value": [...]}`。多值标签统一经
//! [`DicomJsonDataset::strings`] 读取，其余访问方法都建立在它之上。

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// 单个实例的 DICOM JSON 数据集
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DicomJsonDataset(Map<String, Value>);

impl DicomJsonDataset {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// 追加一个元素，用于构造测试数据与内存存储内容
    pub fn with(mut self, tag: &str, vr: &str, values: Vec<Value>) -> Self {
        self.0
            .insert(tag.to_ascii_uppercase(), json!({ "vr": vr, "Value": values }));
        self
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.element(tag).is_some()
    }

    fn element(&self, tag: &str) -> Option<&Value> {
        self.0
            .get(tag)
            .or_else(|| self.0.get(&tag.to_ascii_uppercase()))
    }

    fn raw_values(&self, tag: &str) -> &[Value] {
        self.element(tag)
            .and_then(|element| element.get("Value"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// 标签的全部值，按出现顺序
    ///
    /// 字符串去除首尾空白；以反斜杠拼接的多值字符串会被拆开；
    /// 数值转为十进制文本；对象（如PN）与null被忽略。
    pub fn strings(&self, tag: &str) -> Vec<String> {
        let mut out = Vec::new();
        for value in self.raw_values(tag) {
            match value {
                Value::String(s) => out.extend(s.split('\\').map(|part| part.trim().to_string())),
                Value::Number(n) => out.push(n.to_string()),
                _ => {}
            }
        }
        out
    }

    /// 第一个值，缺失时为空串
    pub fn string(&self, tag: &str) -> String {
        self.strings(tag).into_iter().next().unwrap_or_default()
    }

    /// 解析为浮点数组；`expected` 大于0时要求数量完全一致
    ///
    /// 无法解析的单个值会被跳过，因此数量校验同时拦截了残缺数据。
    pub fn floats(&self, tag: &str, expected: usize) -> Option<Vec<f64>> {
        let values: Vec<f64> = self
            .strings(tag)
            .iter()
            .filter_map(|s| s.parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .collect();
        if values.is_empty() || (expected > 0 && values.len() != expected) {
            return None;
        }
        Some(values)
    }

    /// 整数值（IS），接受字符串或数值形式
    pub fn integer(&self, tag: &str) -> Option<i32> {
        let first = self.string(tag);
        if first.is_empty() {
            return None;
        }
        first.parse::<i32>().ok().or_else(|| {
            first
                .parse::<f64>()
                .ok()
                .filter(|v| v.fract() == 0.0 && v.abs() <= i32::MAX as f64)
                .map(|v| v as i32)
        })
    }
}

impl From<Map<String, Value>> for DicomJsonDataset {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
