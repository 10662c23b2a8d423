//! Access to the archive of GOES imagery in object storage.
//!
//! The NOAA open data buckets are public, so requests are sent unsigned.
use crate::BolideResult;
use log::debug;
use serde::Deserialize;
use std::time::Duration;

/// Default template for a bucket endpoint, `{bucket}` is replaced by the bucket name.
pub const DEFAULT_ENDPOINT_TEMPLATE: &str = "https://{bucket}.s3.amazonaws.com";

/// The storage operations needed to find and download imagery.
pub trait ObjectStore {
    /// List the keys in a bucket that start with `prefix`.
    ///
    /// Keys are returned in the order the store lists them, which for S3 is lexicographic.
    fn list_keys(&self, bucket: &str, prefix: &str, delimiter: &str) -> BolideResult<Vec<String>>;

    /// Download a whole object.
    fn get(&self, bucket: &str, key: &str) -> BolideResult<Vec<u8>>;
}

impl<T: ObjectStore + ?Sized> ObjectStore for &T {
    fn list_keys(&self, bucket: &str, prefix: &str, delimiter: &str) -> BolideResult<Vec<String>> {
        (**self).list_keys(bucket, prefix, delimiter)
    }

    fn get(&self, bucket: &str, key: &str) -> BolideResult<Vec<u8>> {
        (**self).get(bucket, key)
    }
}

/// Settings for the S3 client.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// The bucket endpoint, must contain `{bucket}`.
    pub endpoint_template: String,
    /// Request timeout, applied to listings and downloads.
    pub timeout: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            endpoint_template: DEFAULT_ENDPOINT_TEMPLATE.to_owned(),
            timeout: Duration::from_secs(300),
        }
    }
}

/// A blocking S3 client.
///
/// Create one and pass it by reference to everything that needs storage.
#[derive(Debug, Clone)]
pub struct S3Client {
    client: reqwest::blocking::Client,
    config: StorageConfig,
}

impl S3Client {
    pub fn new(config: StorageConfig) -> BolideResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("bolidebox/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(S3Client { client, config })
    }

    /// The base URL of a bucket.
    pub fn bucket_url(&self, bucket: &str) -> String {
        self.config
            .endpoint_template
            .replace("{bucket}", bucket)
            .trim_end_matches('/')
            .to_owned()
    }

    /// The URL of an object.
    pub fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}", self.bucket_url(bucket), key)
    }
}

impl ObjectStore for S3Client {
    fn list_keys(&self, bucket: &str, prefix: &str, delimiter: &str) -> BolideResult<Vec<String>> {
        let url = format!("{}/", self.bucket_url(bucket));
        debug!("listing {} with prefix {}", url, prefix);

        let text = self
            .client
            .get(&url)
            .query(&[
                ("list-type", "2"),
                ("prefix", prefix),
                ("delimiter", delimiter),
            ])
            .send()?
            .error_for_status()?
            .text()?;

        parse_list_bucket_result(&text)
    }

    fn get(&self, bucket: &str, key: &str) -> BolideResult<Vec<u8>> {
        let url = self.object_url(bucket, key);
        debug!("downloading {}", url);

        let bytes = self.client.get(&url).send()?.error_for_status()?.bytes()?;
        debug!("downloaded {} bytes", bytes.len());

        Ok(bytes.to_vec())
    }
}

#[derive(Debug, Deserialize)]
struct ListBucketResult {
    #[serde(rename = "Contents", default)]
    contents: Vec<ListedObject>,
}

#[derive(Debug, Deserialize)]
struct ListedObject {
    #[serde(rename = "Key")]
    key: String,
}

/// Pull the object keys out of a `ListObjectsV2` response.
fn parse_list_bucket_result(xml: &str) -> BolideResult<Vec<String>> {
    let result: ListBucketResult = quick_xml::de::from_str(xml)?;
    Ok(result.contents.into_iter().map(|obj| obj.key).collect())
}
