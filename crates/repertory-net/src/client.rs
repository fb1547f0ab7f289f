//! The shared HTTP transport (spec §4.2 "C2"): URL construction, SigV4
//! signing, a process-wide client, and bounded cancel/retry semantics.
//!
//! URL construction is grounded on `curl_comm::construct_url` and
//! `curl_comm::create_host_config` in
//! `examples/original_source/src/comm/curl/curl_comm.cpp`; the shared-client
//! lifecycle is grounded on the same file's module-level `curl_comm`
//! instance, which amortizes one curl-multi handle (and its DNS cache)
//! across every request.

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use repertory_common::config::{HostConfig, S3Config};
use repertory_common::{ApiError, Result};

use crate::error::{is_dns_failure, to_api_error};
use crate::request::{PutSource, Request};
use crate::sigv4::{self, SigningCredentials};

const MAX_ATTEMPTS: u32 = 5;
const RETRY_BACKOFF: Duration = Duration::from_secs(1);
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
static SHARED_CLIENT_REFCOUNT: AtomicUsize = AtomicUsize::new(0);

/// Returns the process-wide `reqwest::Client`, building it on first use.
/// Every `HttpTransport` holds a guard that increments/decrements this
/// refcount so logging can report when the last transport drops (the
/// client itself is never torn down early: `reqwest::Client` is cheap to
/// keep alive and rebuilding it would lose the connection pool and DNS
/// cache the original's shared curl-multi handle exists to preserve).
fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .build()
            .expect("reqwest client with default TLS backend")
    })
}

/// Resolved connection target for one request: scheme, host, port, base
/// path, and optional basic-auth credentials. Mirrors the original's
/// `host_config` (spec §4.2).
#[derive(Clone, Debug)]
pub struct ResolvedHost {
    pub protocol: String,
    pub host_name_or_ip: String,
    pub api_port: u16,
    pub path: String,
    pub api_user: String,
    pub api_password: String,
}

impl ResolvedHost {
    /// Builds the resolved host for a Sia renterd endpoint: local HTTP API,
    /// no virtual-hosting, basic-auth credentials from `SiaConfig`.
    #[must_use]
    pub fn from_sia(host_config: &HostConfig, username: &str, password: &str) -> Self {
        Self {
            protocol: "http".to_string(),
            host_name_or_ip: host_config.host_name_or_ip.clone(),
            api_port: host_config.api_port,
            path: host_config.path.clone(),
            api_user: username.to_string(),
            api_password: password.to_string(),
        }
    }

    /// `create_host_config` from `curl_comm.cpp`: splits `config.url` into
    /// scheme/host, optionally injects the region between the first two
    /// labels of the host (`use_region_in_url`), and either prefixes the
    /// bucket onto the host (virtual-hosted style) or keeps it as the first
    /// path segment (path style).
    #[must_use]
    pub fn from_s3(config: &S3Config, use_region_in_url: bool) -> Self {
        let pos = config.url.find(':').unwrap_or(0);
        let protocol = config.url[..pos].to_string();
        let mut host = config.url[pos + 3..].to_string();

        if use_region_in_url && !config.region.is_empty() {
            let mut parts: Vec<&str> = host.split('.').collect();
            if parts.len() > 1 {
                let region = config.region.clone();
                parts.insert(1, region.as_str());
                host = parts.join(".");
            }
        }

        let (host_name_or_ip, path) = if config.use_path_style {
            (host, format!("/{}", config.bucket))
        } else {
            (format!("{}.{host}", config.bucket), String::new())
        };

        Self {
            protocol,
            host_name_or_ip,
            api_port: 0,
            path,
            api_user: config.access_key.clone(),
            api_password: config.secret_key.clone(),
        }
    }
}

/// `construct_url` from `curl_comm.cpp`: `scheme://host[:port]/path[/relative]`.
/// Port is omitted when it is the scheme's default (80 for http, 443 for
/// https) or unset (`0`).
fn construct_url(host: &ResolvedHost, relative_path: &str) -> String {
    let custom_port = if (host.protocol == "http" && matches!(host.api_port, 0 | 80))
        || (host.protocol == "https" && matches!(host.api_port, 0 | 443))
    {
        String::new()
    } else {
        format!(":{}", host.api_port)
    };

    let mut url = format!(
        "{}://{}{custom_port}",
        host.protocol,
        host.host_name_or_ip.trim()
    );

    let base = if host.path.is_empty() {
        "/".to_string()
    } else if host.path.starts_with('/') {
        host.path.clone()
    } else {
        format!("/{}", host.path)
    };

    url.push_str(&base);
    if !relative_path.is_empty() {
        if !url.ends_with('/') {
            url.push('/');
        }
        url.push_str(&url_encode_path(relative_path));
    }
    url
}

/// Percent-encodes a relative path while preserving `/` separators, the
/// Rust equivalent of `curl_comm::url_encode(curl, data, allow_slash=true)`
/// (`curl_easy_escape` followed by restoring `%2F` back to `/`). Written by
/// hand rather than pulling in a URL-encoding crate the rest of the
/// workspace has no other use for.
fn url_encode_path(path: &str) -> String {
    path.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'/' => {
                (b as char).to_string()
            }
            _ => format!("%{b:02X}"),
        })
        .collect()
}

/// Cooperative cancel flag, polled at `CANCEL_POLL_INTERVAL` granularity
/// while a request future is in flight (spec §4.2).
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A successful response: status, headers, and body bytes.
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Holds a reference into the shared client pool; signs and retries
/// requests against one resolved host.
pub struct HttpTransport {
    host: ResolvedHost,
    s3_signing: Option<SigningCredentials>,
}

impl HttpTransport {
    #[must_use]
    pub fn new(host: ResolvedHost) -> Self {
        SHARED_CLIENT_REFCOUNT.fetch_add(1, Ordering::SeqCst);
        shared_client();
        Self {
            host,
            s3_signing: None,
        }
    }

    /// Enables AWS SigV4 signing for every request issued through this
    /// transport (S3-compatible backends only).
    #[must_use]
    pub fn with_s3_signing(mut self, creds: SigningCredentials) -> Self {
        self.s3_signing = Some(creds);
        self
    }

    /// Issues `request`, retrying only on DNS-resolution failures (spec
    /// §4.2 "Retries": up to `MAX_ATTEMPTS`, 1 s backoff), observing `cancel`
    /// at `CANCEL_POLL_INTERVAL` granularity.
    pub async fn send(&self, request: &Request, cancel: &CancelToken) -> Result<Response> {
        let mut last_err = None;
        for attempt in 1..=MAX_ATTEMPTS {
            if cancel.is_cancelled() {
                return Err(ApiError::DownloadStopped);
            }

            match self.send_once(request, cancel).await {
                Ok(response) => return Ok(response),
                Err(ApiError::DownloadStopped | ApiError::UploadStopped) => {
                    return Err(ApiError::DownloadStopped)
                }
                Err(err) => {
                    let retryable = matches!(&err, ApiError::CommError(msg) if msg.contains("dns resolution failed"));
                    if !retryable || attempt == MAX_ATTEMPTS {
                        return Err(err);
                    }
                    tracing::warn!(attempt, %err, "retrying after dns failure");
                    last_err = Some(err);
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
            }
        }
        Err(last_err.unwrap_or(ApiError::CommError("retry loop exhausted".to_string())))
    }

    async fn send_once(&self, request: &Request, cancel: &CancelToken) -> Result<Response> {
        let url = construct_url(&self.host, request.relative_path());
        let method = Method::from_bytes(request.method().as_bytes())
            .expect("request method is a fixed valid token");

        let mut builder = shared_client().request(method, &url);
        for (key, value) in request.query() {
            builder = builder.query(&[(key, value)]);
        }

        if !self.host.api_user.is_empty() {
            builder = builder.basic_auth(&self.host.api_user, Some(&self.host.api_password));
        }

        builder = match request {
            Request::Get { range: Some((start, end)), .. } => {
                builder.header("Range", format!("bytes={start}-{end}"))
            }
            Request::Post { body, content_type, .. } => {
                builder.header("Content-Type", *content_type).body(body.clone())
            }
            Request::PutFile { source, .. } => match source {
                PutSource::File(path) => {
                    let bytes = tokio::fs::read(path).await.map_err(ApiError::Io)?;
                    builder.body(bytes)
                }
                PutSource::Bytes(bytes) => builder.body(bytes.clone()),
                PutSource::Stream(reader) => {
                    let reader = Arc::clone(reader);
                    let bytes = tokio::task::spawn_blocking(move || {
                        let mut buf = Vec::new();
                        reader.lock().expect("reader mutex poisoned").read_to_end(&mut buf)?;
                        std::io::Result::Ok(buf)
                    })
                    .await
                    .map_err(|e| ApiError::Error(format!("upload reader task panicked: {e}")))?
                    .map_err(ApiError::Io)?;
                    builder.body(bytes)
                }
                PutSource::Empty => builder.body(Vec::new()),
            },
            _ => builder,
        };

        if self.s3_signing.is_some() {
            builder = self.sign(builder, request)?;
        }

        let future = builder.send();
        tokio::pin!(future);

        let mut poll = tokio::time::interval(CANCEL_POLL_INTERVAL);
        let response = loop {
            tokio::select! {
                biased;
                _ = poll.tick() => {
                    if cancel.is_cancelled() {
                        return Err(ApiError::DownloadStopped);
                    }
                }
                result = &mut future => break result.map_err(to_api_error)?,
            }
        };

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(to_api_error)?;
        Ok(Response { status, headers, body })
    }

    fn sign(
        &self,
        builder: reqwest::RequestBuilder,
        request: &Request,
    ) -> Result<reqwest::RequestBuilder> {
        let creds = self
            .s3_signing
            .as_ref()
            .expect("sign is only called when s3_signing is Some");

        let payload_sha256 = match request {
            Request::Post { body, .. } => sigv4::hex_sha256(body),
            _ => sigv4::hex_sha256(b""),
        };

        let mut headers = BTreeMap::new();
        headers.insert(
            "host".to_string(),
            self.host.host_name_or_ip.clone(),
        );

        let signed = sigv4::sign_request(
            creds,
            request.method(),
            &format!("/{}", request.relative_path()),
            "",
            &headers,
            &payload_sha256,
            sigv4::now_unix_secs(),
        );

        let header_name = |name: &str| {
            HeaderName::from_bytes(name.as_bytes()).expect("static header names are valid")
        };
        let header_value =
            |value: &str| HeaderValue::from_str(value).map_err(|e| ApiError::Error(e.to_string()));

        Ok(builder
            .header(header_name("authorization"), header_value(&signed.authorization)?)
            .header(header_name("x-amz-date"), header_value(&signed.amz_date)?)
            .header(
                header_name("x-amz-content-sha256"),
                header_value(&signed.content_sha256)?,
            ))
    }
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        let remaining = SHARED_CLIENT_REFCOUNT.fetch_sub(1, Ordering::SeqCst) - 1;
        tracing::trace!(remaining, "http transport dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repertory_common::config::HostConfig;

    #[test]
    fn construct_url_omits_default_http_port() {
        let host = ResolvedHost {
            protocol: "http".to_string(),
            host_name_or_ip: "localhost".to_string(),
            api_port: 80,
            path: String::new(),
            api_user: String::new(),
            api_password: String::new(),
        };
        assert_eq!(construct_url(&host, "objects/a.txt"), "http://localhost/objects/a.txt");
    }

    #[test]
    fn construct_url_keeps_nonstandard_port() {
        let host = ResolvedHost {
            protocol: "http".to_string(),
            host_name_or_ip: "localhost".to_string(),
            api_port: 9980,
            path: "/api/bus".to_string(),
            api_user: String::new(),
            api_password: String::new(),
        };
        assert_eq!(
            construct_url(&host, "objects/a.txt"),
            "http://localhost:9980/api/bus/objects/a.txt"
        );
    }

    #[test]
    fn resolved_host_from_sia_uses_local_http() {
        let hc = HostConfig {
            host_name_or_ip: "127.0.0.1".to_string(),
            api_port: 9980,
            agent_string: String::new(),
            path: "/api/bus".to_string(),
        };
        let host = ResolvedHost::from_sia(&hc, "user", "pass");
        assert_eq!(host.protocol, "http");
        assert_eq!(host.api_user, "user");
    }

    #[test]
    fn resolved_host_from_s3_path_style_keeps_bucket_in_path() {
        let mut cfg = S3Config {
            bucket: "my-bucket".to_string(),
            access_key: "AKID".to_string(),
            secret_key: "secret".to_string(),
            region: "us-east-1".to_string(),
            url: "https://s3.amazonaws.com".to_string(),
            use_path_style: true,
            encryption_token: String::new(),
        };
        let host = ResolvedHost::from_s3(&cfg, false);
        assert_eq!(host.host_name_or_ip, "s3.amazonaws.com");
        assert_eq!(host.path, "/my-bucket");

        cfg.use_path_style = false;
        let host = ResolvedHost::from_s3(&cfg, false);
        assert_eq!(host.host_name_or_ip, "my-bucket.s3.amazonaws.com");
        assert_eq!(host.path, "");
    }

    #[test]
    fn resolved_host_from_s3_injects_region_in_url() {
        let cfg = S3Config {
            bucket: "my-bucket".to_string(),
            access_key: "AKID".to_string(),
            secret_key: "secret".to_string(),
            region: "eu-west-1".to_string(),
            url: "https://s3.amazonaws.com".to_string(),
            use_path_style: true,
            encryption_token: String::new(),
        };
        let host = ResolvedHost::from_s3(&cfg, true);
        assert_eq!(host.host_name_or_ip, "s3.eu-west-1.amazonaws.com");
    }

    #[test]
    fn cancel_token_reports_cancellation() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }
}
