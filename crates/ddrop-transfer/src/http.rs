//! reqwest implementations of the transport and backend seams

use std::time::Duration;

use async_trait::async_trait;
use ddrop_core::api::{
    BurnRequest, BurnResponse, DropResponse, FieldMap, FinalizeRequest, FinalizeResponse,
    PickupRequest, PresignRequest, PresignResponse, ShortCodeResponse,
};
use ddrop_core::config::BackendConfig;
use ddrop_core::{DropError, DropResult, HttpStatus, ObjectRef, ShortCode};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::backend::DropBackend;
use crate::transport::{is_expired_response, redact_url, ObjectTransport};

/// Longest error body kept in an error value
const MAX_ERROR_BODY: usize = 512;

fn build_client(timeout: Duration) -> DropResult<reqwest::Client> {
    // reqwest keeps no cookie store unless the `cookies` feature is on,
    // so presigned requests carry no ambient credentials.
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| DropError::Config(format!("building HTTP client: {e}")))
}

fn truncate_body(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}

/// Presigned PUT/GET over HTTPS
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> DropResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
        })
    }

    fn header_map(target: ObjectRef, headers: &FieldMap) -> DropResult<HeaderMap> {
        let mut map = HeaderMap::with_capacity(headers.len());
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                DropError::InvalidResponse(format!("{target}: bad header name {name:?}: {e}"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                DropError::InvalidResponse(format!("{target}: bad header value: {e}"))
            })?;
            map.insert(name, value);
        }
        Ok(map)
    }
}

#[async_trait]
impl ObjectTransport for HttpTransport {
    async fn put(
        &self,
        target: ObjectRef,
        url: &str,
        headers: &FieldMap,
        body: Vec<u8>,
    ) -> DropResult<()> {
        let header_map = Self::header_map(target, headers)?;
        let size = body.len();
        debug!(%target, url = redact_url(url), size, "PUT");

        let resp = self
            .client
            .put(url)
            .headers(header_map)
            .body(body)
            .send()
            .await
            .map_err(|e| DropError::UploadRejected {
                target,
                status: HttpStatus(e.status().map(|s| s.as_u16())),
                body: e.to_string(),
            })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        if is_expired_response(status.as_u16(), &body) {
            warn!(%target, "presigned upload URL expired");
            return Err(DropError::PresignedUrlExpired { target });
        }
        warn!(%target, status = status.as_u16(), "upload rejected");
        Err(DropError::UploadRejected {
            target,
            status: HttpStatus(Some(status.as_u16())),
            body: truncate_body(body),
        })
    }

    async fn get(&self, target: ObjectRef, url: &str) -> DropResult<Vec<u8>> {
        debug!(%target, url = redact_url(url), "GET");

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DropError::DownloadFailed {
                target,
                status: HttpStatus(e.status().map(|s| s.as_u16())),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            if is_expired_response(status.as_u16(), &body) {
                return Err(DropError::PresignedUrlExpired { target });
            }
            return Err(DropError::DownloadFailed {
                target,
                status: HttpStatus(Some(status.as_u16())),
            });
        }

        resp.bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|_| DropError::DownloadFailed {
                target,
                status: HttpStatus(Some(status.as_u16())),
            })
    }
}

/// JSON client for the backend API
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(cfg: &BackendConfig) -> DropResult<Self> {
        cfg.check_endpoint()?;
        let base_url = Url::parse(&cfg.api_base_url)
            .map_err(|e| DropError::Config(format!("backend.api_base_url: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(DropError::Config(format!(
                "backend.api_base_url cannot carry a path: {base_url}"
            )));
        }
        Ok(Self {
            client: build_client(Duration::from_secs(cfg.timeout_secs))?,
            base_url,
        })
    }

    /// Endpoint URL with each segment percent-encoded
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // checked in `new`
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn post_json<B: Serialize + Sync, R: DeserializeOwned + Send>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> DropResult<R> {
        let url = self.url(segments);
        let resp = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(request_error)?;
        decode(url.path(), resp).await
    }

    async fn get_json<R: DeserializeOwned + Send>(&self, segments: &[&str]) -> DropResult<R> {
        let url = self.url(segments);
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(request_error)?;
        decode(url.path(), resp).await
    }
}

fn request_error(e: reqwest::Error) -> DropError {
    DropError::Backend {
        status: HttpStatus(e.status().map(|s| s.as_u16())),
        body: e.to_string(),
    }
}

async fn check_status(what: &str, resp: Response) -> DropResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = truncate_body(resp.text().await.unwrap_or_default());
    Err(match status {
        StatusCode::NOT_FOUND => DropError::NotFound(what.to_string()),
        StatusCode::CONFLICT => DropError::NotReady(format!("{what}: {body}")),
        _ => DropError::Backend {
            status: HttpStatus(Some(status.as_u16())),
            body,
        },
    })
}

async fn decode<R: DeserializeOwned + Send>(what: &str, resp: Response) -> DropResult<R> {
    let resp = check_status(what, resp).await?;
    resp.json::<R>()
        .await
        .map_err(|e| DropError::InvalidResponse(format!("{what}: {e}")))
}

#[async_trait]
impl DropBackend for HttpBackend {
    async fn presign(&self, req: &PresignRequest) -> DropResult<PresignResponse> {
        self.post_json(&["api", "presign"], req).await
    }

    async fn finalize(&self, req: &FinalizeRequest) -> DropResult<FinalizeResponse> {
        self.post_json(&["api", "drops"], req).await
    }

    async fn resolve_short_code(&self, code: &ShortCode) -> DropResult<ShortCodeResponse> {
        self.get_json(&["api", "short", code.as_str()]).await
    }

    async fn get_drop(&self, drop_id: &str) -> DropResult<DropResponse> {
        self.get_json(&["api", "drops", drop_id]).await
    }

    async fn log_pickup(&self, drop_id: &str, req: &PickupRequest) -> DropResult<()> {
        let url = self.url(&["api", "drops", drop_id, "pickup"]);
        let resp = self
            .client
            .post(url.clone())
            .json(req)
            .send()
            .await
            .map_err(request_error)?;
        check_status(url.path(), resp).await.map(|_| ())
    }

    async fn burn_drop(&self, drop_id: &str, req: &BurnRequest) -> DropResult<BurnResponse> {
        self.post_json(&["api", "drops", drop_id, "burn"], req).await
    }
}
