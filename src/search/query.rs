//! Query parser / 查询解析器
//!
//! Turns `tag:"Adware,Trojan" limit:5` into one `RequestSpec` per
//! (filter, comma-separated value) pair. Any malformed token aborts the whole
//! query; nothing is silently skipped.
//! 任何格式错误的词都会使整个查询失败，不会被静默跳过。

use serde::Serialize;

use crate::bazaar::Form;
use crate::error::ParseError;
use crate::utils::collapse_whitespace;

/// Default result limit / 默认结果数量
pub const DEFAULT_LIMIT: u32 = 100;
/// API maximum for `limit` / API允许的最大limit
pub const MAX_LIMIT: u32 = 1000;

/// Recognized filter / 已识别的过滤器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    Signature,
    Tag,
    FileType,
    Hash,
    Limit,
}

impl Filter {
    /// Resolve an accepted alias (case-sensitive) / 解析别名(区分大小写)
    pub fn from_alias(alias: &str) -> Option<Self> {
        match alias {
            "sig" | "sign" | "signature" => Some(Filter::Signature),
            "tag" => Some(Filter::Tag),
            "type" | "ft" | "filetype" | "file_type" => Some(Filter::FileType),
            "sha256" | "sha-256" | "sha" | "hash" => Some(Filter::Hash),
            "limit" => Some(Filter::Limit),
            _ => None,
        }
    }

    /// Form key sent to the API / 发送给API的表单键
    pub fn key(&self) -> &'static str {
        match self {
            Filter::Signature => "signature",
            Filter::Tag => "tag",
            Filter::FileType => "file_type",
            Filter::Hash => "hash",
            Filter::Limit => "limit",
        }
    }

    /// API query for this filter, `None` for `limit` / 过滤器对应的API查询
    pub fn query_kind(&self) -> Option<QueryKind> {
        match self {
            Filter::Signature => Some(QueryKind::GetSiginfo),
            Filter::Tag => Some(QueryKind::GetTaginfo),
            Filter::FileType => Some(QueryKind::GetFileType),
            Filter::Hash => Some(QueryKind::GetInfo),
            Filter::Limit => None,
        }
    }
}

/// API query kind / API查询类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    GetSiginfo,
    GetTaginfo,
    GetFileType,
    GetInfo,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::GetSiginfo => "get_siginfo",
            QueryKind::GetTaginfo => "get_taginfo",
            QueryKind::GetFileType => "get_file_type",
            QueryKind::GetInfo => "get_info",
        }
    }
}

/// One outbound API call / 单个API请求描述
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RequestSpec {
    pub query_kind: QueryKind,
    pub filter_key: String,
    pub filter_value: String,
    /// `None` for hash lookups, the API rejects a limit there / 哈希查询不带limit
    pub limit: Option<u32>,
}

impl RequestSpec {
    /// Form fields for the POST body / POST表单字段
    pub fn to_form(&self) -> Form {
        let mut form = vec![
            ("query".to_string(), self.query_kind.as_str().to_string()),
            (self.filter_key.clone(), self.filter_value.clone()),
        ];
        if let Some(limit) = self.limit {
            form.push(("limit".to_string(), limit.to_string()));
        }
        form
    }

    /// Short label for logs / 日志标签
    pub fn label(&self) -> String {
        format!("{}:{}", self.filter_key, self.filter_value)
    }
}

/// Non-empty ordered batch of specs / 非空的有序请求批次
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestBatch {
    specs: Vec<RequestSpec>,
}

impl RequestBatch {
    /// Build a batch, rejecting an empty one / 构建批次，拒绝空批次
    pub fn new(specs: Vec<RequestSpec>) -> Result<Self, ParseError> {
        if specs.is_empty() {
            return Err(ParseError::IllegalQuery("query produced no requests".to_string()));
        }
        Ok(Self { specs })
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn specs(&self) -> &[RequestSpec] {
        &self.specs
    }

    pub fn into_specs(self) -> Vec<RequestSpec> {
        self.specs
    }
}

/// Query parser with configurable limits / 可配置限制的查询解析器
#[derive(Debug, Clone, Copy)]
pub struct QueryParser {
    default_limit: u32,
    max_limit: u32,
}

impl Default for QueryParser {
    fn default() -> Self {
        Self::new(DEFAULT_LIMIT, MAX_LIMIT)
    }
}

impl QueryParser {
    pub fn new(default_limit: u32, max_limit: u32) -> Self {
        let max_limit = max_limit.max(1);
        Self {
            default_limit: default_limit.clamp(1, max_limit),
            max_limit,
        }
    }

    /// Parse a raw query into a batch / 将原始查询解析为请求批次
    pub fn parse(&self, raw_query: &str) -> Result<RequestBatch, ParseError> {
        let query = collapse_whitespace(raw_query);
        if query.is_empty() {
            return Err(ParseError::NoQuery);
        }

        let mut filters: Vec<(Filter, String)> = Vec::new();
        let mut limit: Option<i64> = None;

        for token in query.split(' ') {
            let (keyword, value) = split_token(token)?;

            let filter = Filter::from_alias(keyword)
                .ok_or_else(|| ParseError::IllegalQuery(format!("unknown keyword '{}'", keyword)))?;

            if filter == Filter::Limit {
                limit = Some(parse_limit(value)?);
                continue;
            }

            filters.push((filter, unquote(token, value)?.to_string()));
        }

        if filters.is_empty() {
            return Err(ParseError::IllegalQuery("no filter given".to_string()));
        }

        let limit = match limit {
            Some(value) => value.clamp(1, self.max_limit as i64) as u32,
            None => self.default_limit,
        };

        let mut specs: Vec<RequestSpec> = Vec::new();
        for (filter, value) in filters {
            let Some(query_kind) = filter.query_kind() else {
                continue;
            };

            for name in value.split(',').filter(|name| !name.is_empty()) {
                let spec = RequestSpec {
                    query_kind,
                    filter_key: filter.key().to_string(),
                    filter_value: name.to_string(),
                    limit: if filter == Filter::Hash { None } else { Some(limit) },
                };
                // 重复的请求只保留一次 / identical requests are sent once
                if !specs.contains(&spec) {
                    specs.push(spec);
                }
            }
        }

        RequestBatch::new(specs)
    }
}

/// Parse with the default limits / 使用默认限制解析
pub fn parse(raw_query: &str) -> Result<RequestBatch, ParseError> {
    QueryParser::default().parse(raw_query)
}

/// Parse a `limit:` value, saturating digit runs too long for `i64` / 解析limit(超长数字饱和处理)
fn parse_limit(value: &str) -> Result<i64, ParseError> {
    let (negative, digits) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::IllegalQuery(format!("limit '{}' is not a number", value)));
    }

    Ok(match value.parse::<i64>() {
        Ok(parsed) => parsed,
        Err(_) if negative => i64::MIN,
        Err(_) => i64::MAX,
    })
}

/// Split `keyword:value` on its single colon / 按唯一的冒号拆分
fn split_token(token: &str) -> Result<(&str, &str), ParseError> {
    let mut parts = token.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(keyword), Some(value), None) => Ok((keyword, value)),
        _ => Err(ParseError::IllegalQuery(format!(
            "'{}' must contain exactly one ':'",
            token
        ))),
    }
}

/// Strip the surrounding double quotes / 去除两侧双引号
fn unquote<'a>(token: &str, value: &'a str) -> Result<&'a str, ParseError> {
    value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .filter(|inner| !inner.is_empty())
        .ok_or_else(|| ParseError::IllegalQuery(format!("value of '{}' must be a non-empty quoted string", token)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(kind: QueryKind, key: &str, value: &str, limit: Option<u32>) -> RequestSpec {
        RequestSpec {
            query_kind: kind,
            filter_key: key.to_string(),
            filter_value: value.to_string(),
            limit,
        }
    }

    #[test]
    fn test_single_tag() {
        let batch = parse(r#"tag:"Adware""#).unwrap();
        assert_eq!(batch.specs(), &[spec(QueryKind::GetTaginfo, "tag", "Adware", Some(100))]);
        assert_eq!(
            batch.specs()[0].to_form(),
            vec![
                ("query".to_string(), "get_taginfo".to_string()),
                ("tag".to_string(), "Adware".to_string()),
                ("limit".to_string(), "100".to_string()),
            ]
        );
    }

    #[test]
    fn test_hash_has_no_limit() {
        let batch = parse(r#"hash:"abc123""#).unwrap();
        assert_eq!(batch.specs(), &[spec(QueryKind::GetInfo, "hash", "abc123", None)]);
        assert!(batch.specs()[0].to_form().iter().all(|(key, _)| key != "limit"));
    }

    #[test]
    fn test_comma_split_with_limit() {
        let batch = parse(r#"tag:"Adware,Trojan" limit:5"#).unwrap();
        assert_eq!(
            batch.specs(),
            &[
                spec(QueryKind::GetTaginfo, "tag", "Adware", Some(5)),
                spec(QueryKind::GetTaginfo, "tag", "Trojan", Some(5)),
            ]
        );
    }

    #[test]
    fn test_limit_clamped() {
        let batch = parse(r#"limit:2000 tag:"X""#).unwrap();
        assert_eq!(batch.specs()[0].limit, Some(1000));

        let batch = parse(r#"limit:0 tag:"X""#).unwrap();
        assert_eq!(batch.specs()[0].limit, Some(1));
    }

    #[test]
    fn test_oversized_limit_saturates() {
        let batch = parse(r#"limit:99999999999999999999 tag:"X""#).unwrap();
        assert_eq!(batch.specs()[0].limit, Some(1000));

        let batch = parse(r#"limit:-99999999999999999999 tag:"X""#).unwrap();
        assert_eq!(batch.specs()[0].limit, Some(1));

        assert!(matches!(parse(r#"limit:12a tag:"X""#), Err(ParseError::IllegalQuery(_))));
        assert!(matches!(parse(r#"limit:- tag:"X""#), Err(ParseError::IllegalQuery(_))));
    }

    #[test]
    fn test_aliases_and_order() {
        let batch = parse(r#"sig:"Emotet" ft:"exe"  sha256:"ff,,ee""#).unwrap();
        let kinds: Vec<_> = batch.specs().iter().map(|s| (s.filter_key.as_str(), s.filter_value.as_str())).collect();
        assert_eq!(
            kinds,
            vec![("signature", "Emotet"), ("file_type", "exe"), ("hash", "ff"), ("hash", "ee")]
        );
    }

    #[test]
    fn test_empty_query() {
        assert_eq!(parse(""), Err(ParseError::NoQuery));
        assert_eq!(parse("   \t "), Err(ParseError::NoQuery));
    }

    #[test]
    fn test_malformed_queries() {
        let bad = [
            r#"tag:"a":b"#,         // two colons
            r#"tag"Adware""#,       // no colon
            r#"family:"Adware""#,   // unknown keyword
            r#"Tag:"Adware""#,      // keywords are case-sensitive
            r#"tag:Adware"#,        // unquoted
            r#"tag:"""#,            // empty quotes
            r#"tag:""#,             // single quote char
            r#"tag:"a" limit:ten"#, // non-numeric limit
            r#"limit:5"#,           // no filter
            r#"tag:",,""#,          // no names after split
            r#"tag:"a" bogus"#,     // stray token
        ];
        for query in bad {
            match parse(query) {
                Err(ParseError::IllegalQuery(_)) => {}
                other => panic!("{} -> {:?}", query, other),
            }
        }
    }

    #[test]
    fn test_duplicates_collapsed() {
        let batch = parse(r#"tag:"A,A" tag:"A,B""#).unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_custom_limits() {
        let parser = QueryParser::new(50, 200);
        assert_eq!(parser.parse(r#"tag:"A""#).unwrap().specs()[0].limit, Some(50));
        assert_eq!(parser.parse(r#"tag:"A" limit:999"#).unwrap().specs()[0].limit, Some(200));
    }

    #[test]
    fn test_empty_batch_rejected() {
        assert!(RequestBatch::new(Vec::new()).is_err());
    }
}
