//! S3 `ListObjectsV2` XML response parsing (spec §4.6 "Listing").

use repertory_common::{ApiError, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename = "ListBucketResult")]
pub struct ListBucketResult {
    #[serde(rename = "IsTruncated", default)]
    pub is_truncated: bool,
    #[serde(rename = "NextContinuationToken")]
    pub next_continuation_token: Option<String>,
    #[serde(rename = "CommonPrefixes", default)]
    pub common_prefixes: Vec<CommonPrefix>,
    #[serde(rename = "Contents", default)]
    pub contents: Vec<Content>,
}

#[derive(Debug, Deserialize)]
pub struct CommonPrefix {
    #[serde(rename = "Prefix")]
    pub prefix: String,
}

#[derive(Debug, Deserialize)]
pub struct Content {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Size")]
    pub size: u64,
}

/// Parses one page of a `ListObjectsV2` response body.
pub fn parse_list_bucket_result(body: &str) -> Result<ListBucketResult> {
    quick_xml::de::from_str(body)
        .map_err(|e| ApiError::Error(format!("failed to parse S3 list response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>my-bucket</Name>
  <Prefix>a/</Prefix>
  <IsTruncated>true</IsTruncated>
  <NextContinuationToken>tok-2</NextContinuationToken>
  <CommonPrefixes><Prefix>a/sub/</Prefix></CommonPrefixes>
  <Contents><Key>a/one.txt</Key><Size>42</Size></Contents>
  <Contents><Key>a/two.txt</Key><Size>7</Size></Contents>
</ListBucketResult>"#;

    #[test]
    fn parses_prefixes_and_contents() {
        let result = parse_list_bucket_result(PAGE).unwrap();
        assert!(result.is_truncated);
        assert_eq!(result.next_continuation_token.as_deref(), Some("tok-2"));
        assert_eq!(result.common_prefixes.len(), 1);
        assert_eq!(result.common_prefixes[0].prefix, "a/sub/");
        assert_eq!(result.contents.len(), 2);
        assert_eq!(result.contents[0].key, "a/one.txt");
        assert_eq!(result.contents[0].size, 42);
    }

    #[test]
    fn last_page_has_no_continuation_token() {
        let page = PAGE
            .replace("<IsTruncated>true</IsTruncated>", "<IsTruncated>false</IsTruncated>")
            .replace("<NextContinuationToken>tok-2</NextContinuationToken>", "");
        let result = parse_list_bucket_result(&page).unwrap();
        assert!(!result.is_truncated);
        assert!(result.next_continuation_token.is_none());
    }
}
