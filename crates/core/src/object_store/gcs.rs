use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::naming::natural_cmp;
use crate::{Error, Result};

use super::{BoxFuture, ObjectStore};

const STORAGE_API_ROOT: &str = "https://storage.googleapis.com/storage/v1";
const UPLOAD_API_ROOT: &str = "https://storage.googleapis.com/upload/storage/v1";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Talks to Google Cloud Storage's JSON API directly over HTTPS (spec.md
/// §4.2, SPEC_FULL §1): no Cloud SDK dependency, just `reqwest`, matching
/// the teacher's own pattern of calling a vendor HTTP API directly
/// (`storage.rs`'s `TelegramBotApiStorage`).
pub struct GcsObjectStore {
    http: reqwest::Client,
    tokens: GcsTokenProvider,
}

impl GcsObjectStore {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            tokens: GcsTokenProvider::new(),
        }
    }

    async fn bearer_token(&self) -> Result<String> {
        self.tokens.get(&self.http).await
    }
}

/// `gs://bucket/object/path` split into its two JSON-API addressable parts.
struct GcsUri {
    bucket: String,
    object: String,
}

fn parse_gs_uri(uri: &str) -> Result<GcsUri> {
    let rest = uri.strip_prefix("gs://").ok_or_else(|| Error::UploadFailed {
        message: format!("not a gs:// uri: {uri}"),
    })?;
    let (bucket, object) = rest.split_once('/').ok_or_else(|| Error::UploadFailed {
        message: format!("gs uri missing object path: {uri}"),
    })?;
    Ok(GcsUri {
        bucket: bucket.to_string(),
        object: object.to_string(),
    })
}

impl ObjectStore for GcsObjectStore {
    fn exists<'a>(&'a self, uri: &'a str) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            let parsed = parse_gs_uri(uri)?;
            let token = self.bearer_token().await?;
            let url = format!(
                "{STORAGE_API_ROOT}/b/{}/o/{}",
                urlencode(&parsed.bucket),
                urlencode(&parsed.object)
            );
            let response = self
                .http
                .get(&url)
                .bearer_auth(token)
                .send()
                .await?;
            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Ok(false);
            }
            let response = response.error_for_status()?;
            let _ = response.bytes().await?;
            Ok(true)
        })
    }

    fn upload<'a>(&'a self, local_path: &'a Path, uri: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let bytes = tokio::fs::read(local_path).await?;
            self.upload_bytes(bytes, uri).await
        })
    }

    fn upload_bytes<'a>(&'a self, bytes: Vec<u8>, uri: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let parsed = parse_gs_uri(uri)?;
            let token = self.bearer_token().await?;
            let url = format!(
                "{UPLOAD_API_ROOT}/b/{}/o?uploadType=media&name={}",
                urlencode(&parsed.bucket),
                urlencode(&parsed.object)
            );
            self.http
                .post(&url)
                .bearer_auth(token)
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(bytes)
                .send()
                .await?
                .error_for_status()?;
            Ok(())
        })
    }

    fn list<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Vec<String>> {
        Box::pin(async move {
            let parsed = parse_prefix(prefix)?;
            let token = self.bearer_token().await?;

            #[derive(Deserialize)]
            struct ListResponse {
                #[serde(default)]
                items: Vec<ListItem>,
                #[serde(rename = "nextPageToken")]
                next_page_token: Option<String>,
            }
            #[derive(Deserialize)]
            struct ListItem {
                name: String,
            }

            let mut names = Vec::new();
            let mut page_token: Option<String> = None;
            loop {
                let mut url = format!(
                    "{STORAGE_API_ROOT}/b/{}/o?prefix={}",
                    urlencode(&parsed.bucket),
                    urlencode(&parsed.object)
                );
                if let Some(token) = &page_token {
                    url.push_str(&format!("&pageToken={}", urlencode(token)));
                }
                let response: ListResponse = self
                    .http
                    .get(&url)
                    .bearer_auth(token.clone())
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                names.extend(
                    response
                        .items
                        .into_iter()
                        .map(|item| format!("gs://{}/{}", parsed.bucket, item.name)),
                );
                match response.next_page_token {
                    Some(next) => page_token = Some(next),
                    None => break,
                }
            }
            names.sort_by(|a, b| natural_cmp(a, b));
            Ok(names)
        })
    }

    fn compose<'a>(&'a self, target: &'a str, sources: &'a [String]) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if sources.len() > super::COMPOSE_FANIN_MAX {
                return Err(Error::ComposeFailed {
                    message: format!(
                        "compose source count {} exceeds COMPOSE_FANIN_MAX {}",
                        sources.len(),
                        super::COMPOSE_FANIN_MAX
                    ),
                });
            }

            let target_parsed = parse_gs_uri(target)?;
            let token = self.bearer_token().await?;

            let mut source_objects = Vec::with_capacity(sources.len());
            for source in sources {
                let parsed = parse_gs_uri(source)?;
                if parsed.bucket != target_parsed.bucket {
                    return Err(Error::ComposeFailed {
                        message: format!(
                            "compose source {source} is in a different bucket than target {target}"
                        ),
                    });
                }
                source_objects.push(serde_json::json!({ "name": parsed.object }));
            }

            let body = serde_json::json!({
                "sourceObjects": source_objects,
                "destination": { "contentType": "application/gzip" },
            });

            let url = format!(
                "{STORAGE_API_ROOT}/b/{}/o/{}/compose",
                urlencode(&target_parsed.bucket),
                urlencode(&target_parsed.object)
            );
            self.http
                .post(&url)
                .bearer_auth(token)
                .json(&body)
                .send()
                .await?
                .error_for_status()
                .map_err(|e| Error::ComposeFailed {
                    message: e.to_string(),
                })?;
            Ok(())
        })
    }

    fn delete<'a>(&'a self, uri: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let parsed = parse_gs_uri(uri)?;
            let token = self.bearer_token().await?;
            let url = format!(
                "{STORAGE_API_ROOT}/b/{}/o/{}",
                urlencode(&parsed.bucket),
                urlencode(&parsed.object)
            );
            let response = self.http.delete(&url).bearer_auth(token).send().await?;
            if response.status() != reqwest::StatusCode::NOT_FOUND {
                response.error_for_status()?;
            }
            Ok(())
        })
    }

    fn delete_many<'a>(&'a self, uris: &'a [String]) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            for uri in uris {
                self.delete(uri).await?;
            }
            Ok(())
        })
    }
}

fn parse_prefix(prefix: &str) -> Result<GcsUri> {
    let rest = prefix.strip_prefix("gs://").ok_or_else(|| Error::UploadFailed {
        message: format!("not a gs:// uri: {prefix}"),
    })?;
    match rest.split_once('/') {
        Some((bucket, object)) => Ok(GcsUri {
            bucket: bucket.to_string(),
            object: object.to_string(),
        }),
        None => Ok(GcsUri {
            bucket: rest.to_string(),
            object: String::new(),
        }),
    }
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Caches a bearer token until shortly before its reported expiry, per the
/// teacher's pattern of treating credential lookup as a fallible, cacheable
/// operation (`secrets.rs`). Either a statically configured token
/// (`GOOGLE_OAUTH_ACCESS_TOKEN`, convenient for local runs and tests) or a
/// GCE metadata-server fetch (the production path when this runs on a GCE
/// instance with an attached service account).
struct GcsTokenProvider {
    cached: Mutex<Option<(String, Instant)>>,
}

impl GcsTokenProvider {
    fn new() -> Self {
        Self {
            cached: Mutex::new(None),
        }
    }

    async fn get(&self, http: &reqwest::Client) -> Result<String> {
        if let Ok(token) = std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN") {
            if !token.is_empty() {
                return Ok(token);
            }
        }

        {
            let guard = self.cached.lock().expect("token cache mutex poisoned");
            if let Some((token, expires_at)) = guard.as_ref() {
                if *expires_at > Instant::now() {
                    return Ok(token.clone());
                }
            }
        }

        #[derive(Deserialize)]
        struct MetadataTokenResponse {
            access_token: String,
            expires_in: u64,
        }

        let response: MetadataTokenResponse = http
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let expires_at = Instant::now() + Duration::from_secs(response.expires_in.saturating_sub(30));
        *self.cached.lock().expect("token cache mutex poisoned") =
            Some((response.access_token.clone(), expires_at));
        Ok(response.access_token)
    }
}
