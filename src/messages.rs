//! User-facing message vocabulary / 面向用户的消息词汇表
//!
//! The display layer only ever receives one of these codes plus optional
//! format arguments; `{0}`, `{1}`... in a template are replaced in order.

use serde::{Deserialize, Serialize};

/// Message severity / 消息级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Information,
    Warning,
    Critical,
}

/// Fixed error code vocabulary / 固定错误码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NoQuery,
    IllegalQuery,
    ConnectionError,
    HttpError,
    Timeout,
    TagNotFound,
    NoResults,
    IllegalTag,
    IllegalSignature,
    IllegalHash,
    FileNotFound,
    UnknownError,
}

/// Rendered message / 渲染后的消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserMessage {
    pub code: ErrorCode,
    pub severity: Severity,
    pub title: String,
    pub message: String,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NoQuery => "no_query",
            ErrorCode::IllegalQuery => "illegal_query",
            ErrorCode::ConnectionError => "connection_error",
            ErrorCode::HttpError => "http_error",
            ErrorCode::Timeout => "timeout",
            ErrorCode::TagNotFound => "tag_not_found",
            ErrorCode::NoResults => "no_results",
            ErrorCode::IllegalTag => "illegal_tag",
            ErrorCode::IllegalSignature => "illegal_signature",
            ErrorCode::IllegalHash => "illegal_hash",
            ErrorCode::FileNotFound => "file_not_found",
            ErrorCode::UnknownError => "unknown_error",
        }
    }

    /// Map an API `query_status` to a code / 将API的query_status映射为错误码
    ///
    /// Statuses outside the vocabulary fall back to `unknown_error`.
    pub fn from_status(status: &str) -> Self {
        match status {
            "no_query" => ErrorCode::NoQuery,
            "illegal_query" => ErrorCode::IllegalQuery,
            "tag_not_found" | "no_tag_provided" => ErrorCode::TagNotFound,
            "no_results" | "signature_not_found" | "hash_not_found" | "no_file_type"
            | "illegal_file_type" => {
                ErrorCode::NoResults
            }
            "illegal_tag" => ErrorCode::IllegalTag,
            "illegal_signature" | "no_signature_provided" => ErrorCode::IllegalSignature,
            "illegal_hash" | "no_hash_provided" | "illegal_sha256_hash" | "no_sha256_hash" => {
                ErrorCode::IllegalHash
            }
            "file_not_found" => ErrorCode::FileNotFound,
            _ => ErrorCode::UnknownError,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            ErrorCode::TagNotFound | ErrorCode::NoResults => Severity::Information,
            ErrorCode::ConnectionError
            | ErrorCode::HttpError
            | ErrorCode::Timeout
            | ErrorCode::UnknownError => Severity::Critical,
            _ => Severity::Warning,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ErrorCode::NoQuery => "Empty search query",
            ErrorCode::IllegalQuery => "Wrong search query",
            ErrorCode::ConnectionError | ErrorCode::HttpError | ErrorCode::Timeout => {
                "An error occured!"
            }
            ErrorCode::TagNotFound => "Tag not found",
            ErrorCode::NoResults => "No results",
            ErrorCode::IllegalTag | ErrorCode::IllegalSignature | ErrorCode::IllegalHash => "Warning",
            ErrorCode::FileNotFound => "File not found",
            ErrorCode::UnknownError => "Unknown error",
        }
    }

    fn template(&self) -> &'static str {
        match self {
            ErrorCode::NoQuery => "Please input a search query.",
            ErrorCode::IllegalQuery => "The search query syntax is incorrect. Please try again.",
            ErrorCode::ConnectionError => {
                "Connection error:\n\n{0}\n\nPlease check your Internet connection and try again."
            }
            ErrorCode::HttpError => "HTTP Error {0}: {1}\nPlease try again in a little bit.",
            ErrorCode::Timeout => {
                "API request failed with a timeout.\n\nYou can adjust session timeout in settings or try again. \
                 The session has timed out a total of {0} time(-s)."
            }
            ErrorCode::TagNotFound => {
                "The specified tag does not exist in the database.\nPlease input a different tag."
            }
            ErrorCode::NoResults => {
                "The search query did not match any malware samples.\nPlease try again with different keywords."
            }
            ErrorCode::IllegalTag => {
                "API Request Warning: Illegal tag name or tag not found.\nTags can't be empty and must be alphanumeric. \
                 Please correct your search query."
            }
            ErrorCode::IllegalSignature => {
                "API Request Warning: Illegal signature or signature not found.\nSignatures can't be empty and must be \
                 alphanumeric. Please correct your search query."
            }
            ErrorCode::IllegalHash => {
                "API Request Warning: Illegal hash or hash not found.\nHashes can't be empty and must be alphanumeric. \
                 Please correct your search query."
            }
            ErrorCode::FileNotFound => {
                "Download failed. The following sample:\n\n{0}\n\nwas not found on the download server. It might have \
                 been taken down while the search was underway. Please select a different sample to download."
            }
            ErrorCode::UnknownError => "An unknown error occured.\n\n{0}",
        }
    }

    /// Render the message with format arguments / 使用参数渲染消息
    ///
    /// Missing arguments leave an empty slot rather than the raw placeholder.
    pub fn render(&self, args: &[String]) -> UserMessage {
        let mut message = self.template().to_string();
        for index in 0..4 {
            let placeholder = format!("{{{}}}", index);
            if message.contains(&placeholder) {
                let value = args.get(index).map(String::as_str).unwrap_or("");
                message = message.replace(&placeholder, value);
            }
        }

        UserMessage {
            code: *self,
            severity: self.severity(),
            title: self.title().to_string(),
            message: message.trim_end().to_string(),
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
