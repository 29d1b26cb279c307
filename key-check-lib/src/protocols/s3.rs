//! S3 REST client built on `ListObjectsV2`.
//!
//! Requests are path-style (`{endpoint}/{bucket}?list-type=2&...`) and signed
//! with SigV4 from the `AWS_*` environment credentials. Unsigned mode is kept
//! for public buckets and open S3-compatible endpoints.

use crate::error::KeyCheckError;
use crate::protocols::sigv4::{self, uri_encode, Credentials};
use crate::protocols::{ListedObject, ObjectLister};
use crate::types::{CheckConfig, DEFAULT_REGION};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;

/// Root of a `ListObjectsV2` response.
///
/// `Name` is always sent by the service; requiring it rejects bodies that
/// parse as XML but are not a listing (error pages, proxies).
#[derive(Debug, Deserialize)]
struct ListBucketResult {
    #[serde(rename = "Name")]
    #[allow(dead_code)]
    name: String,
    #[serde(rename = "Contents", default)]
    contents: Vec<ListedContents>,
}

#[derive(Debug, Deserialize)]
struct ListedContents {
    #[serde(rename = "Key")]
    key: String,
}

/// Parse a `ListObjectsV2` XML body into listed objects.
pub(crate) fn parse_list_response(body: &str) -> Result<Vec<ListedObject>, KeyCheckError> {
    let result: ListBucketResult = quick_xml::de::from_str(body)?;
    Ok(result
        .contents
        .into_iter()
        .map(|c| ListedObject::new(c.key))
        .collect())
}

/// S3 client for prefix listings.
#[derive(Clone, Debug)]
pub struct S3Client {
    /// HTTP client for making listing requests
    http_client: reqwest::Client,
    /// Base URL, without trailing slash
    endpoint: String,
    /// Region used in the signing scope
    region: String,
    /// Signing credentials; `None` sends anonymous requests
    credentials: Option<Credentials>,
}

impl S3Client {
    /// Create an unsigned client for the AWS endpoint of `region`.
    pub fn new(region: &str) -> Result<Self, KeyCheckError> {
        Ok(Self::with_endpoint(default_endpoint(region), Duration::from_secs(30))?
            .with_region(region))
    }

    /// Create an unsigned client for a custom endpoint.
    pub fn with_endpoint<E: Into<String>>(
        endpoint: E,
        timeout: Duration,
    ) -> Result<Self, KeyCheckError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout + Duration::from_secs(2)) // Add buffer over the per-check timeout
            .build()
            .map_err(|e| {
                KeyCheckError::network_with_source("Failed to create S3 HTTP client", e.to_string())
            })?;

        Ok(Self {
            http_client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            region: DEFAULT_REGION.to_string(),
            credentials: None,
        })
    }

    /// Create a client from a run configuration.
    ///
    /// Uses `config.endpoint` when set, otherwise the AWS endpoint for
    /// `config.region`. Unless `config.unsigned` is set, requests are signed
    /// with credentials from the environment.
    ///
    /// # Errors
    ///
    /// Returns `KeyCheckError::ConfigError` if signing is required and no
    /// credentials are set.
    pub fn from_config(config: &CheckConfig) -> Result<Self, KeyCheckError> {
        let credentials = if config.unsigned {
            None
        } else {
            Some(Credentials::from_env().ok_or_else(|| {
                KeyCheckError::config(
                    "AWS credentials not found: set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY, or use --no-sign-request",
                )
            })?)
        };
        Self::from_parts(config, credentials)
    }

    /// Create a client from a run configuration with explicit credentials.
    pub fn from_parts(
        config: &CheckConfig,
        credentials: Option<Credentials>,
    ) -> Result<Self, KeyCheckError> {
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| default_endpoint(&config.region));
        let client = Self::with_endpoint(endpoint, config.timeout)?.with_region(&config.region);
        Ok(match credentials {
            Some(credentials) => client.with_credentials(credentials),
            None => client,
        })
    }

    /// Set the region used for request signing.
    pub fn with_region<R: Into<String>>(mut self, region: R) -> Self {
        self.region = region.into();
        self
    }

    /// Sign every request with `credentials`.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Whether requests carry a SigV4 signature.
    pub fn is_signed(&self) -> bool {
        self.credentials.is_some()
    }

    fn bucket_url(&self, bucket: &str) -> String {
        format!("{}/{}", self.endpoint, bucket)
    }

    /// Build a signed (or anonymous) listing request.
    fn list_request(
        &self,
        bucket: &str,
        prefix: &str,
        max_keys: &str,
    ) -> Result<reqwest::RequestBuilder, KeyCheckError> {
        // The sent query must match the signed canonical query byte for byte.
        let raw = format!(
            "{}?list-type=2&max-keys={}&prefix={}",
            self.bucket_url(bucket),
            max_keys,
            uri_encode(prefix)
        );
        let url = Url::parse(&raw)
            .map_err(|e| KeyCheckError::config(format!("Invalid S3 URL '{}': {}", raw, e)))?;

        let mut request = self.http_client.get(url.clone());
        if let Some(credentials) = &self.credentials {
            for (name, value) in sigv4::sign_get(&url, &self.region, credentials, Utc::now())? {
                request = request.header(name, value);
            }
        }
        Ok(request)
    }

    async fn make_list_request(
        &self,
        bucket: &str,
        prefix: &str,
        max_keys: &str,
    ) -> Result<Vec<ListedObject>, KeyCheckError> {
        let response = self
            .list_request(bucket, prefix, max_keys)?
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let body = response.text().await?;
                parse_list_response(&body)
            }
            StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map(Duration::from_secs);
                Err(KeyCheckError::RateLimited {
                    service: "s3".to_string(),
                    message: format!("listing '{}' was throttled", prefix),
                    retry_after,
                })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(KeyCheckError::storage_with_status(
                    bucket,
                    "Access denied",
                    response.status().as_u16(),
                ))
            }
            // A listing 404 is about the bucket, never about the key.
            StatusCode::NOT_FOUND => Err(KeyCheckError::storage_with_status(
                bucket,
                "No such bucket",
                404,
            )),
            code => Err(KeyCheckError::storage_with_status(
                bucket,
                format!("S3 returned error: {}", code),
                code.as_u16(),
            )),
        }
    }
}

#[async_trait]
impl ObjectLister for S3Client {
    async fn list_by_prefix(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ListedObject>, KeyCheckError> {
        // Listings are lexicographic and a key sorts before every other key it
        // is a prefix of, so one result is enough to see an exact match.
        self.make_list_request(bucket, prefix, "1").await
    }

    async fn probe(&self, bucket: &str) -> Result<(), KeyCheckError> {
        self.make_list_request(bucket, "", "0").await.map(|_| ())
    }
}

fn default_endpoint(region: &str) -> String {
    format!("https://s3.{}.amazonaws.com", region)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
    <Name>images</Name>
    <Prefix>a/b.jpg</Prefix>
    <KeyCount>1</KeyCount>
    <MaxKeys>1</MaxKeys>
    <IsTruncated>false</IsTruncated>
    <Contents>
        <Key>a/b.jpg</Key>
        <LastModified>2024-01-01T00:00:00.000Z</LastModified>
        <ETag>"d41d8cd98f00b204e9800998ecf8427e"</ETag>
        <Size>2048</Size>
        <StorageClass>STANDARD</StorageClass>
    </Contents>
</ListBucketResult>"#;

    const EMPTY_LISTING: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
    <Name>images</Name>
    <Prefix>c/d.jpg</Prefix>
    <KeyCount>0</KeyCount>
    <MaxKeys>1</MaxKeys>
    <IsTruncated>false</IsTruncated>
</ListBucketResult>"#;

    #[test]
    fn test_parse_listing_with_contents() {
        let objects = parse_list_response(LISTING).unwrap();
        assert_eq!(
            objects,
            vec![ListedObject::new("a/b.jpg")]
        );
    }

    #[test]
    fn test_parse_listing_without_contents() {
        assert!(parse_list_response(EMPTY_LISTING).unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_non_listing_bodies() {
        assert!(matches!(
            parse_list_response("<html><body>gateway</body></html>"),
            Err(KeyCheckError::ParseError { .. })
        ));
        assert!(parse_list_response("").is_err());
        assert!(parse_list_response("not xml at all").is_err());
    }

    #[test]
    fn test_endpoint_selection() {
        let client = S3Client::new("us-west-2").unwrap();
        assert_eq!(client.endpoint(), "https://s3.us-west-2.amazonaws.com");

        let config = CheckConfig::for_bucket("images")
            .with_endpoint("http://localhost:9000/")
            .with_unsigned(true);
        let client = S3Client::from_config(&config).unwrap();
        assert!(!client.is_signed());
        assert_eq!(client.endpoint(), "http://localhost:9000");
        assert_eq!(client.bucket_url("images"), "http://localhost:9000/images");
    }

    fn signed_client() -> S3Client {
        let config = CheckConfig::for_bucket("images").with_region("eu-west-1");
        S3Client::from_parts(&config, Some(Credentials::new("AKID", "secret"))).unwrap()
    }

    #[test]
    fn test_signed_request_carries_authorization() {
        let client = signed_client();
        assert!(client.is_signed());

        let request = client
            .list_request("images", "a/b c.jpg", "1")
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(
            request.url().as_str(),
            "https://s3.eu-west-1.amazonaws.com/images?list-type=2&max-keys=1&prefix=a%2Fb%20c.jpg"
        );
        let authorization = request
            .headers()
            .get(reqwest::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap();
        assert!(authorization.starts_with("AWS4-HMAC-SHA256 Credential=AKID/"));
        assert!(authorization.contains("/eu-west-1/s3/aws4_request"));
        assert!(request.headers().contains_key("x-amz-date"));
        assert!(request.headers().contains_key("x-amz-content-sha256"));
    }

    #[test]
    fn test_unsigned_request_has_no_authorization() {
        let config = CheckConfig::for_bucket("images").with_unsigned(true);
        let client = S3Client::from_config(&config).unwrap();

        let request = client.list_request("images", "", "0").unwrap().build().unwrap();

        assert!(request.headers().get(reqwest::header::AUTHORIZATION).is_none());
        assert!(request.url().as_str().ends_with("?list-type=2&max-keys=0&prefix="));
    }
}
