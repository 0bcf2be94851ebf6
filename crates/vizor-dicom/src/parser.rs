//! DICOM文件头解析器
//!
//! 只读取到像素数据之前，提取分组检查所需的少量标签。

use dicom::core::value::{PrimitiveValue, Value};
use dicom::core::Tag;
use dicom::dictionary_std::tags;
use dicom::object::file::ReadPreamble;
use dicom::object::{DefaultDicomObject, OpenFileOptions};
use tracing::debug;
use vizor_core::{InstanceHeader, Result, VizorError};

/// Part 10 文件的前导区长度
const PREAMBLE_LEN: usize = 128;

/// DICOM文件头解析器
pub struct HeaderParser;

impl HeaderParser {
    /// 解析DICOM字节数据，跳过像素数据
    pub fn parse_bytes(data: &[u8]) -> Result<InstanceHeader> {
        let body = strip_preamble(data);

        let obj = OpenFileOptions::new()
            .read_preamble(ReadPreamble::Never)
            .read_until(tags::PIXEL_DATA)
            .from_reader(body)
            .map_err(|e| VizorError::DicomParse(format!("无法解析DICOM数据: {}", e)))?;

        Ok(Self::extract_header(&obj))
    }

    fn extract_header(obj: &DefaultDicomObject) -> InstanceHeader {
        let header = InstanceHeader {
            study_instance_uid: first_string(obj, tags::STUDY_INSTANCE_UID),
            series_instance_uid: first_string(obj, tags::SERIES_INSTANCE_UID),
            sop_instance_uid: first_string(obj, tags::SOP_INSTANCE_UID),
            modality: first_string(obj, tags::MODALITY),
            study_date: first_string(obj, tags::STUDY_DATE),
            study_description: first_string(obj, tags::STUDY_DESCRIPTION),
        };
        debug!(
            "提取DICOM文件头: 检查UID={}, SOP UID={}",
            header.study_instance_uid, header.sop_instance_uid
        );
        header
    }
}

/// 存在 "DICM" 魔数时去掉128字节前导区
fn strip_preamble(data: &[u8]) -> &[u8] {
    if data.len() >= PREAMBLE_LEN + 4 && &data[PREAMBLE_LEN..PREAMBLE_LEN + 4] == b"DICM" {
        &data[PREAMBLE_LEN..]
    } else {
        data
    }
}

/// 取标签的第一个字符串值并去除首尾空白，缺失时返回空串
fn first_string(obj: &DefaultDicomObject, tag: Tag) -> String {
    match obj.element(tag) {
        Ok(element) => match element.value() {
            Value::Primitive(PrimitiveValue::Str(s)) => clean(s),
            Value::Primitive(PrimitiveValue::Strs(strings)) => {
                strings.first().map(|s| clean(s)).unwrap_or_default()
            }
            _ => {
                debug!("标签 {:?} 不是字符串类型", tag);
                String::new()
            }
        },
        Err(_) => String::new(),
    }
}

/// UID 以 \0 补齐偶数长度，其余字符串以空格补齐
fn clean(value: &str) -> String {
    value.trim_matches(|c: char| c.is_whitespace() || c == '\0').to_string()
}
