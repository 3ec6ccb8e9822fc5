use serde::{Deserialize, Serialize};

use crate::messages::ErrorCode;
use crate::utils::format_size;

/// One malware sample / 单个恶意样本
///
/// `sha256_hash` is the identity key used for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub file_name: String,
    pub file_type: String,
    pub file_size: u64,
    pub signature: String,
    pub sha256_hash: String,
    pub first_seen: String,
    pub downloads: u64,
    pub uploads: u64,
    pub tags: Vec<String>,
}

/// Display-ready sample row / 可直接显示的样本行
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayRecord {
    pub file_name: String,
    pub file_type: String,
    pub size: String,
    pub signature: String,
    pub sha256_hash: String,
    pub first_seen: String,
    pub downloads: String,
    pub uploads: String,
    pub tags: String,
}

impl From<&SampleRecord> for DisplayRecord {
    fn from(record: &SampleRecord) -> Self {
        Self {
            file_name: record.file_name.clone(),
            file_type: record.file_type.clone(),
            size: format_size(record.file_size),
            signature: record.signature.clone(),
            sha256_hash: record.sha256_hash.clone(),
            first_seen: record.first_seen.clone(),
            downloads: record.downloads.to_string(),
            uploads: record.uploads.to_string(),
            tags: record.tags.join(", "),
        }
    }
}

/// Deduplicated result of one search / 一次搜索的去重结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    /// Samples in first-seen order / 按首次出现顺序排列
    pub records: Vec<SampleRecord>,
    /// `query_status` of every sub-request that came back non-ok / 非ok子请求的状态
    pub empty_statuses: Vec<String>,
}

impl SearchResult {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Why the result is empty, if it is / 结果为空的原因
    ///
    /// The first API status wins; an empty result without statuses is `no_results`.
    pub fn empty_reason(&self) -> Option<ErrorCode> {
        if !self.records.is_empty() {
            return None;
        }
        Some(
            self.empty_statuses
                .first()
                .map(|status| ErrorCode::from_status(status))
                .unwrap_or(ErrorCode::NoResults),
        )
    }

    pub fn display_records(&self) -> Vec<DisplayRecord> {
        self.records.iter().map(DisplayRecord::from).collect()
    }
}
