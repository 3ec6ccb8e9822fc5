//! MalwareBazaar data type definitions / MalwareBazaar数据类型定义

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::models::SampleRecord;

/// Status value of a successful query / 成功查询的状态值
pub const STATUS_OK: &str = "ok";

/// Query response / 查询响应
#[derive(Debug, Deserialize, Default)]
pub struct QueryResp {
    /// Required, a reply without it is malformed / 必填字段
    pub query_status: String,
    /// `data` is absent or a bare string on most non-ok statuses / 非ok状态下通常缺失
    #[serde(default, deserialize_with = "samples_or_empty")]
    pub data: Vec<BazaarSample>,
}

impl QueryResp {
    pub fn is_ok(&self) -> bool {
        self.query_status == STATUS_OK
    }
}

/// Sample as returned by the API / API返回的样本
#[derive(Debug, Clone, Deserialize, Default)]
pub struct BazaarSample {
    #[serde(default, deserialize_with = "string_or_empty")]
    pub file_name: String,
    #[serde(default, deserialize_with = "string_or_empty")]
    pub file_type: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub file_size: u64,
    #[serde(default, deserialize_with = "string_or_empty")]
    pub signature: String,
    #[serde(default)]
    pub sha256_hash: String,
    #[serde(default, deserialize_with = "string_or_empty")]
    pub first_seen: String,
    #[serde(default, deserialize_with = "tags_or_empty")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub intelligence: Intelligence,
}

/// Download/upload counters / 下载与上传计数
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Intelligence {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub downloads: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub uploads: u64,
}

impl From<BazaarSample> for SampleRecord {
    fn from(sample: BazaarSample) -> Self {
        let mut tags: Vec<String> = Vec::with_capacity(sample.tags.len());
        for tag in sample.tags {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }

        SampleRecord {
            file_name: sample.file_name,
            file_type: sample.file_type,
            file_size: sample.file_size,
            signature: sample.signature,
            sha256_hash: sample.sha256_hash,
            first_seen: sample.first_seen,
            downloads: sample.intelligence.downloads,
            uploads: sample.intelligence.uploads,
            tags,
        }
    }
}

/// Numbers arrive either as JSON numbers or as strings ("313") / 数字可能是字符串
fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

fn string_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn tags_or_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

fn samples_or_empty<'de, D>(deserializer: D) -> Result<Vec<BazaarSample>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Array(items) => serde_json::from_value(Value::Array(items)).map_err(serde::de::Error::custom),
        _ => Ok(Vec::new()),
    }
}
