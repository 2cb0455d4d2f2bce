//! Google Cloud Storage over its JSON API.
//!
//! Requests carry a bearer token when one is configured. With
//! `STORAGE_EMULATOR_HOST` set, every request goes to that host instead of
//! `storage.googleapis.com`.

use std::env;
use std::io;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use crate::cloud::{ObjectMeta, ObjectStore};
use crate::error::SourceError;
use crate::source::SourceReader;

pub const GCS_ENDPOINT: &str = "https://storage.googleapis.com";
pub const EMULATOR_HOST_ENV: &str = "STORAGE_EMULATOR_HOST";
pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

#[derive(Debug, Clone)]
pub struct GcsConfig {
    pub endpoint: String,
    pub access_token: Option<String>,
    pub connect_timeout: Duration,
}

impl Default for GcsConfig {
    fn default() -> Self {
        Self {
            endpoint: GCS_ENDPOINT.to_string(),
            access_token: None,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl GcsConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(endpoint) = env::var(EMULATOR_HOST_ENV)
            .ok()
            .and_then(|host| emulator_endpoint(&host))
        {
            config.endpoint = endpoint;
        }
        config.access_token = env::var(ACCESS_TOKEN_ENV)
            .ok()
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty());
        config
    }
}

/// Emulator hosts are usually given as `host:port`; plain HTTP is assumed then.
fn emulator_endpoint(host: &str) -> Option<String> {
    let host = host.trim();
    if host.is_empty() {
        None
    } else if host.contains("://") {
        Some(host.to_string())
    } else {
        Some(format!("http://{host}"))
    }
}

#[derive(Debug)]
pub struct GcsObjectStore {
    client: Client,
    endpoint: Url,
    access_token: Option<String>,
}

impl GcsObjectStore {
    pub fn new(config: GcsConfig) -> Result<Self, SourceError> {
        let endpoint = Url::parse(&config.endpoint).map_err(|err| {
            SourceError::Unavailable(format!(
                "invalid storage endpoint '{}': {err}",
                config.endpoint
            ))
        })?;
        // Object downloads stream for as long as the analysis reads them.
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(None::<Duration>)
            .gzip(true)
            .build()
            .map_err(|err| {
                SourceError::Unavailable(format!("failed to build storage client: {err}"))
            })?;
        Ok(Self {
            client,
            endpoint,
            access_token: config.access_token,
        })
    }

    pub fn from_env() -> Result<Self, SourceError> {
        Self::new(GcsConfig::from_env())
    }

    fn bucket_url(&self, segments: &[&str]) -> Result<Url, SourceError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| {
                SourceError::Unavailable(format!(
                    "storage endpoint {} cannot carry a path",
                    self.endpoint
                ))
            })?
            .pop_if_empty()
            .extend(["storage", "v1", "b"])
            .extend(segments);
        Ok(url)
    }

    fn get(&self, url: Url) -> reqwest::Result<Response> {
        let mut request = self.client.get(url);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }
        request.send()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPage {
    #[serde(default)]
    items: Vec<ListedObject>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// The JSON API reports sizes as decimal strings.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedObject {
    name: String,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    content_type: Option<String>,
}

impl ObjectStore for GcsObjectStore {
    fn check_bucket(&self, bucket: &str) -> Result<(), SourceError> {
        let url = self.bucket_url(&[bucket])?;
        let response = self.get(url).map_err(|err| {
            SourceError::Unavailable(format!("bucket '{bucket}' unreachable: {err}"))
        })?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(SourceError::Unavailable(format!(
                "bucket '{bucket}' not found"
            ))),
            status => Err(SourceError::Unavailable(format!(
                "bucket '{bucket}' not accessible: HTTP {status}"
            ))),
        }
    }

    fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectMeta>, SourceError> {
        let mut objects = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url = self.bucket_url(&[bucket, "o"])?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("prefix", prefix);
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }

            let response = self.get(url).map_err(|err| {
                SourceError::Unavailable(format!("failed to list bucket '{bucket}': {err}"))
            })?;
            let status = response.status();
            if !status.is_success() {
                return Err(SourceError::Unavailable(format!(
                    "failed to list bucket '{bucket}': HTTP {status}"
                )));
            }
            let page: ListPage = response.json().map_err(|err| {
                SourceError::Unavailable(format!("malformed listing for bucket '{bucket}': {err}"))
            })?;

            objects.extend(page.items.into_iter().map(|item| ObjectMeta {
                bucket: bucket.to_string(),
                size: item.size.and_then(|size| size.parse().ok()).unwrap_or(0),
                content_type: item.content_type.unwrap_or_default(),
                name: item.name,
            }));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        debug!("listed {} object(s) in gs://{}/{}", objects.len(), bucket, prefix);
        Ok(objects)
    }

    fn open_object(&self, bucket: &str, name: &str) -> Result<SourceReader, SourceError> {
        let path = format!("gs://{bucket}/{name}");
        let mut url = self.bucket_url(&[bucket, "o", name])?;
        url.query_pairs_mut().append_pair("alt", "media");

        let response = self.get(url).map_err(|err| SourceError::OpenFailed {
            path: path.clone(),
            source: io::Error::other(err),
        })?;
        match response.status() {
            status if status.is_success() => Ok(Box::new(response)),
            StatusCode::NOT_FOUND => Err(SourceError::ObjectNotFound {
                bucket: bucket.to_string(),
                name: name.to_string(),
            }),
            status => Err(SourceError::OpenFailed {
                path,
                source: io::Error::other(format!("HTTP {status}")),
            }),
        }
    }
}
