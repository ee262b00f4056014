//! In-process backend over an OpenDAL memory operator
//!
//! Behaves like the real collaborator where the client can observe it:
//! - presigned PUTs succeed only with exactly the signed header map
//! - presigned URLs stop working after their TTL ("Request has expired")
//! - a drop answers 409 until finalized, short codes are 6 chars of A-Z0-9
//!   and resolve case-insensitively
//! - burning deletes every stored object of the drop
//!
//! One value serves as both `DropBackend` and `ObjectTransport`; URLs it
//! hands out use the `sim://` scheme and are meaningless to anything else.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use ddrop_core::api::{
    BurnRequest, BurnResponse, ChunkDownload, DropResponse, FieldMap, FinalizeRequest,
    FinalizeResponse, PickupRequest, PresignRequest, PresignResponse, PresignedChunk,
    PresignedObject, ShortCodeResponse,
};
use ddrop_core::{DropError, DropResult, HttpStatus, Manifest, ObjectRef, ShortCode, SHORT_CODE_LEN};
use opendal::Operator;
use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::backend::DropBackend;
use crate::operator::build_memory_operator;
use crate::transport::{ObjectTransport, CHUNK_CONTENT_TYPE, MANIFEST_CONTENT_TYPE};

const SHORT_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const MAX_SHORT_CODE_TRIES: usize = 8;
const SIGNED_SSE: &str = "AES256";
const SIGNED_ACL: &str = "bucket-owner-full-control";
/// Expired grants keep answering "Request has expired" this long before
/// they are forgotten
const EXPIRED_GRANT_RETENTION: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct SimulatedOptions {
    /// Lifetime of presigned upload URLs (default: 900s)
    pub upload_ttl: Duration,
    /// Lifetime of presigned download URLs (default: 600s)
    pub download_ttl: Duration,
    /// Lifetime of a drop when the sender asked for none (default: 30 days)
    pub default_drop_ttl: Duration,
    /// Return S3-style field maps with each upload target. When false the
    /// targets carry no fields and only `Content-Type` is signed.
    pub signed_fields: bool,
}

impl Default for SimulatedOptions {
    fn default() -> Self {
        Self {
            upload_ttl: Duration::from_secs(900),
            download_ttl: Duration::from_secs(600),
            default_drop_ttl: Duration::from_secs(30 * 86_400),
            signed_fields: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Put,
    Get,
}

#[derive(Debug, Clone)]
struct Grant {
    method: Method,
    key: String,
    headers: FieldMap,
    expires_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DropStatus {
    Uploading,
    Ready,
    Burning,
    Deleted,
}

impl DropStatus {
    fn as_str(self) -> &'static str {
        match self {
            DropStatus::Uploading => "uploading",
            DropStatus::Ready => "ready",
            DropStatus::Burning => "burning",
            DropStatus::Deleted => "deleted",
        }
    }
}

#[derive(Debug)]
struct DropRecord {
    status: DropStatus,
    chunk_keys: Vec<String>,
    manifest_key: String,
    short_code: Option<ShortCode>,
    expires_at: Instant,
    pickups: Vec<PickupRequest>,
}

#[derive(Debug, Default)]
struct State {
    grants: HashMap<String, Grant>,
    drops: HashMap<String, DropRecord>,
    short_codes: HashMap<ShortCode, String>,
}

pub struct SimulatedBackend {
    op: Operator,
    opts: SimulatedOptions,
    state: Mutex<State>,
}

impl std::fmt::Debug for SimulatedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedBackend")
            .field("opts", &self.opts)
            .finish_non_exhaustive()
    }
}

fn signed_headers(content_type: &str, with_fields: bool) -> FieldMap {
    let mut headers = FieldMap::from([("Content-Type".to_string(), content_type.to_string())]);
    if with_fields {
        headers.insert("x-amz-server-side-encryption".into(), SIGNED_SSE.into());
        headers.insert("x-amz-acl".into(), SIGNED_ACL.into());
    }
    headers
}

fn generate_short_code() -> DropResult<ShortCode> {
    let mut rng = rand::thread_rng();
    let code: String = (0..SHORT_CODE_LEN)
        .map(|_| SHORT_CODE_ALPHABET[rng.gen_range(0..SHORT_CODE_ALPHABET.len())] as char)
        .collect();
    ShortCode::parse(&code)
}

fn storage_error(target: ObjectRef, e: opendal::Error) -> DropError {
    DropError::Backend {
        status: HttpStatus(Some(500)),
        body: format!("{target}: {e}"),
    }
}

impl SimulatedBackend {
    pub fn new() -> DropResult<Self> {
        Self::with_options(SimulatedOptions::default())
    }

    pub fn with_options(opts: SimulatedOptions) -> DropResult<Self> {
        Ok(Self {
            op: build_memory_operator()?,
            opts,
            state: Mutex::new(State::default()),
        })
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        // a panic while holding the lock leaves plain maps behind; keep going
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn grant(&self, method: Method, key: &str, headers: FieldMap, ttl: Duration) -> String {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let url = format!("sim://deaddrop/{key}?token={token}");
        let now = Instant::now();
        let mut state = self.state();
        state
            .grants
            .retain(|_, g| now.saturating_duration_since(g.expires_at) < EXPIRED_GRANT_RETENTION);
        state.grants.insert(
            token,
            Grant {
                method,
                key: key.to_string(),
                headers,
                expires_at: now + ttl,
            },
        );
        url
    }

    /// Look up the grant behind a `sim://` URL. Unknown or malformed URLs
    /// answer 403 like a bad signature would.
    fn lookup(&self, url: &str, method: Method) -> Result<Grant, (u16, String)> {
        let token = url
            .strip_prefix("sim://deaddrop/")
            .and_then(|rest| rest.split_once("?token="))
            .map(|(_, token)| token)
            .ok_or_else(|| (400, "<Code>InvalidURI</Code>".to_string()))?;
        let grant = self
            .state()
            .grants
            .get(token)
            .cloned()
            .ok_or_else(|| (403, "<Code>AccessDenied</Code><Message>Invalid token</Message>".to_string()))?;
        if grant.method != method {
            return Err((403, "<Code>SignatureDoesNotMatch</Code>".into()));
        }
        if Instant::now() >= grant.expires_at {
            return Err((
                403,
                "<Code>AccessDenied</Code><Message>Request has expired</Message>".into(),
            ));
        }
        Ok(grant)
    }

    /// Invalidate every outstanding presigned URL, as if its TTL had passed.
    pub fn expire_presigned_urls(&self) {
        let past = Instant::now();
        for grant in self.state().grants.values_mut() {
            grant.expires_at = past;
        }
    }

    /// Raw stored bytes of an object, for inspection in tests.
    pub async fn read_object(&self, key: &str) -> DropResult<Vec<u8>> {
        self.op
            .read(key)
            .await
            .map(|b| b.to_vec())
            .map_err(|e| storage_error(ObjectRef::Payload, e))
    }

    /// Replace a stored object behind the client's back.
    pub async fn overwrite_object(&self, key: &str, data: Vec<u8>) -> DropResult<()> {
        self.op
            .write(key, data)
            .await
            .map(|_| ())
            .map_err(|e| storage_error(ObjectRef::Payload, e))
    }

    pub async fn object_exists(&self, key: &str) -> DropResult<bool> {
        self.op
            .exists(key)
            .await
            .map_err(|e| storage_error(ObjectRef::Payload, e))
    }

    /// Current status string of a drop (`uploading`, `ready`, `burning`, `deleted`)
    pub fn drop_status(&self, drop_id: &str) -> Option<&'static str> {
        self.state().drops.get(drop_id).map(|d| d.status.as_str())
    }

    /// Pickup attempts logged for a drop
    pub fn pickups(&self, drop_id: &str) -> Vec<PickupRequest> {
        self.state()
            .drops
            .get(drop_id)
            .map(|d| d.pickups.clone())
            .unwrap_or_default()
    }

    fn live_drop<'a>(state: &'a mut State, drop_id: &str) -> DropResult<&'a mut DropRecord> {
        match state.drops.get_mut(drop_id) {
            Some(rec) if Instant::now() < rec.expires_at => Ok(rec),
            _ => Err(DropError::NotFound(format!("drop {drop_id}"))),
        }
    }
}

#[async_trait]
impl ObjectTransport for SimulatedBackend {
    async fn put(
        &self,
        target: ObjectRef,
        url: &str,
        headers: &FieldMap,
        body: Vec<u8>,
    ) -> DropResult<()> {
        let grant = match self.lookup(url, Method::Put) {
            Ok(g) => g,
            Err((_, body)) if body.contains("Request has expired") => {
                return Err(DropError::PresignedUrlExpired { target })
            }
            Err((status, body)) => {
                return Err(DropError::UploadRejected {
                    target,
                    status: HttpStatus(Some(status)),
                    body,
                })
            }
        };
        if headers != &grant.headers {
            debug!(%target, ?headers, signed = ?grant.headers, "header mismatch");
            return Err(DropError::UploadRejected {
                target,
                status: HttpStatus(Some(403)),
                body: "<Code>SignatureDoesNotMatch</Code>".into(),
            });
        }
        self.op
            .write(&grant.key, body)
            .await
            .map(|_| ())
            .map_err(|e| DropError::UploadRejected {
                target,
                status: HttpStatus(Some(500)),
                body: e.to_string(),
            })
    }

    async fn get(&self, target: ObjectRef, url: &str) -> DropResult<Vec<u8>> {
        let grant = match self.lookup(url, Method::Get) {
            Ok(g) => g,
            Err((_, body)) if body.contains("Request has expired") => {
                return Err(DropError::PresignedUrlExpired { target })
            }
            Err((status, _)) => {
                return Err(DropError::DownloadFailed {
                    target,
                    status: HttpStatus(Some(status)),
                })
            }
        };
        match self.op.read(&grant.key).await {
            Ok(buf) => Ok(buf.to_vec()),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Err(DropError::DownloadFailed {
                target,
                status: HttpStatus(Some(404)),
            }),
            Err(_) => Err(DropError::DownloadFailed {
                target,
                status: HttpStatus(Some(500)),
            }),
        }
    }
}

#[async_trait]
impl DropBackend for SimulatedBackend {
    async fn presign(&self, req: &PresignRequest) -> DropResult<PresignResponse> {
        if req.chunks.is_empty() {
            return Err(DropError::Backend {
                status: HttpStatus(Some(400)),
                body: "chunks required".into(),
            });
        }

        let drop_id = uuid::Uuid::new_v4().to_string();
        let with_fields = self.opts.signed_fields;
        let mut presigned = Vec::with_capacity(req.chunks.len());
        for chunk in &req.chunks {
            let key = format!("drops/{drop_id}/chunks/{}", chunk.hash);
            let headers = signed_headers(CHUNK_CONTENT_TYPE, with_fields);
            let url = self.grant(Method::Put, &key, headers.clone(), self.opts.upload_ttl);
            presigned.push(PresignedChunk {
                hash: chunk.hash.clone(),
                url,
                key,
                size: chunk.size,
                fields: with_fields.then_some(headers),
            });
        }

        let manifest_key = format!("manifests/{drop_id}/manifest.json");
        let headers = signed_headers(MANIFEST_CONTENT_TYPE, with_fields);
        let manifest_url = self.grant(Method::Put, &manifest_key, headers.clone(), self.opts.upload_ttl);

        let ttl = req
            .meta
            .burn_after_secs
            .map(Duration::from_secs)
            .unwrap_or(self.opts.default_drop_ttl);
        self.state().drops.insert(
            drop_id.clone(),
            DropRecord {
                status: DropStatus::Uploading,
                chunk_keys: presigned.iter().map(|p| p.key.clone()).collect(),
                manifest_key: manifest_key.clone(),
                short_code: None,
                expires_at: Instant::now() + ttl,
                pickups: Vec::new(),
            },
        );
        info!(drop_id = %drop_id, chunks = presigned.len(), size = req.meta.size, "presigned drop");

        Ok(PresignResponse {
            drop_id,
            presigned,
            manifest_presigned: Some(PresignedObject {
                url: manifest_url,
                key: manifest_key,
                fields: with_fields.then_some(headers),
            }),
        })
    }

    async fn finalize(&self, req: &FinalizeRequest) -> DropResult<FinalizeResponse> {
        let manifest_key = {
            let mut state = self.state();
            Self::live_drop(&mut state, &req.drop_id)?.manifest_key.clone()
        };
        if manifest_key != req.manifest_s3_key || !self.object_exists(&manifest_key).await? {
            return Err(DropError::Backend {
                status: HttpStatus(Some(400)),
                body: "manifest_s3_key does not exist in bucket".into(),
            });
        }

        let mut state = self.state();
        let mut code = None;
        for _ in 0..MAX_SHORT_CODE_TRIES {
            let candidate = generate_short_code()?;
            if !state.short_codes.contains_key(&candidate) {
                code = Some(candidate);
                break;
            }
        }
        let code = code.ok_or_else(|| DropError::Backend {
            status: HttpStatus(Some(500)),
            body: "short code allocation failed".into(),
        })?;

        state.short_codes.insert(code.clone(), req.drop_id.clone());
        let rec = Self::live_drop(&mut state, &req.drop_id)?;
        rec.status = DropStatus::Ready;
        rec.short_code = Some(code.clone());
        info!(drop_id = %req.drop_id, short_code = %code, "drop ready");

        Ok(FinalizeResponse {
            drop_id: req.drop_id.clone(),
            short_code: code,
            manifest_s3_key: manifest_key,
        })
    }

    async fn resolve_short_code(&self, code: &ShortCode) -> DropResult<ShortCodeResponse> {
        let mut state = self.state();
        let drop_id = state
            .short_codes
            .get(code)
            .cloned()
            .ok_or_else(|| DropError::NotFound(format!("short code {code}")))?;
        let rec = Self::live_drop(&mut state, &drop_id)?;
        Ok(ShortCodeResponse {
            drop_id,
            short_code: code.clone(),
            status: rec.status.as_str().to_string(),
        })
    }

    async fn get_drop(&self, drop_id: &str) -> DropResult<DropResponse> {
        let (manifest_key, short_code) = {
            let mut state = self.state();
            let rec = Self::live_drop(&mut state, drop_id)?;
            if rec.status != DropStatus::Ready {
                return Err(DropError::NotReady(format!(
                    "drop {drop_id} is {}",
                    rec.status.as_str()
                )));
            }
            let code = rec
                .short_code
                .clone()
                .ok_or_else(|| DropError::NotReady(format!("drop {drop_id} has no short code")))?;
            (rec.manifest_key.clone(), code)
        };

        let raw = self
            .op
            .read(&manifest_key)
            .await
            .map_err(|e| storage_error(ObjectRef::Manifest, e))?;
        let manifest = Manifest::from_bytes(&raw.to_vec())?;

        let chunks = manifest
            .chunks
            .iter()
            .map(|c| ChunkDownload {
                key: c.key.clone(),
                url: self.grant(Method::Get, &c.key, FieldMap::new(), self.opts.download_ttl),
                size: c.size,
                hash: c.hash.clone(),
                iv: c.iv.clone(),
            })
            .collect();

        Ok(DropResponse {
            drop_id: drop_id.to_string(),
            status: DropStatus::Ready.as_str().to_string(),
            short_code,
            manifest,
            chunks,
        })
    }

    async fn log_pickup(&self, drop_id: &str, req: &PickupRequest) -> DropResult<()> {
        let mut state = self.state();
        let rec = Self::live_drop(&mut state, drop_id)?;
        let mut req = req.clone();
        if let Some(ua) = req.user_agent_redacted.as_mut() {
            ua.truncate(ua.char_indices().nth(200).map_or(ua.len(), |(i, _)| i));
        }
        rec.pickups.push(req);
        debug!(drop_id, count = rec.pickups.len(), "pickup logged");
        Ok(())
    }

    async fn burn_drop(&self, drop_id: &str, req: &BurnRequest) -> DropResult<BurnResponse> {
        let keys = {
            let mut state = self.state();
            let rec = Self::live_drop(&mut state, drop_id)?;
            rec.status = DropStatus::Burning;
            let mut keys = rec.chunk_keys.clone();
            keys.push(rec.manifest_key.clone());
            keys
        };

        for key in &keys {
            self.op
                .delete(key)
                .await
                .map_err(|e| storage_error(ObjectRef::Payload, e))?;
        }

        {
            let mut state = self.state();
            state.grants.retain(|_, g| !keys.contains(&g.key));
            if let Some(rec) = state.drops.get_mut(drop_id) {
                rec.status = DropStatus::Deleted;
            }
        }
        info!(drop_id, reason = req.reason.as_deref().unwrap_or("-"), objects = keys.len(), "drop burned");

        Ok(BurnResponse {
            drop_id: drop_id.to_string(),
            status: DropStatus::Burning.as_str().to_string(),
            message: "drop scheduled for deletion".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddrop_core::api::{ChunkInfo, PresignMeta};
    use ddrop_core::{ChunkRecord, ManifestMeta};

    fn presign_req(hashes: &[&str]) -> PresignRequest {
        PresignRequest {
            chunks: hashes
                .iter()
                .map(|h| ChunkInfo {
                    hash: h.to_string(),
                    size: 4,
                })
                .collect(),
            meta: PresignMeta {
                size: 4 * hashes.len() as u64,
                files: vec![],
                burn_after_secs: None,
                burn_after_read: None,
            },
        }
    }

    fn manifest_for(resp: &PresignResponse) -> Manifest {
        Manifest {
            meta: ManifestMeta {
                filename: "f.bin".into(),
                size: 4,
                created_at: chrono::Utc::now(),
                original_files: None,
                is_zip: Some(false),
            },
            chunks: resp
                .presigned
                .iter()
                .map(|p| ChunkRecord {
                    key: p.key.clone(),
                    size: p.size,
                    hash: p.hash.clone(),
                    iv: None,
                })
                .collect(),
            burn_after_read: None,
            encryption: None,
            payload_sha256: None,
        }
    }

    async fn upload_all(sim: &SimulatedBackend, resp: &PresignResponse) {
        for (i, p) in resp.presigned.iter().enumerate() {
            sim.put(ObjectRef::Chunk(i as u64), &p.url, p.fields.as_ref().unwrap(), b"data".to_vec())
                .await
                .unwrap();
        }
        let m = resp.manifest_presigned.as_ref().unwrap();
        sim.put(
            ObjectRef::Manifest,
            &m.url,
            m.fields.as_ref().unwrap(),
            manifest_for(resp).to_bytes().unwrap(),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_presign_shapes_keys_and_fields() {
        let sim = SimulatedBackend::new().unwrap();
        let resp = sim.presign(&presign_req(&["aa", "bb"])).await.unwrap();

        assert_eq!(resp.presigned.len(), 2);
        assert_eq!(resp.presigned[0].key, format!("drops/{}/chunks/aa", resp.drop_id));
        let fields = resp.presigned[0].fields.as_ref().unwrap();
        assert_eq!(fields["Content-Type"], "application/octet-stream");
        assert_eq!(fields["x-amz-server-side-encryption"], "AES256");
        assert_eq!(fields["x-amz-acl"], "bucket-owner-full-control");

        let m = resp.manifest_presigned.unwrap();
        assert_eq!(m.key, format!("manifests/{}/manifest.json", resp.drop_id));
        assert_eq!(m.fields.unwrap()["Content-Type"], "application/json");
    }

    #[tokio::test]
    async fn test_put_rejects_altered_fields() {
        let sim = SimulatedBackend::new().unwrap();
        let resp = sim.presign(&presign_req(&["aa"])).await.unwrap();
        let target = &resp.presigned[0];

        let mut altered = target.fields.clone().unwrap();
        altered.insert("x-amz-acl".into(), "public-read".into());
        let err = sim
            .put(ObjectRef::Chunk(0), &target.url, &altered, b"x".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DropError::UploadRejected { status: HttpStatus(Some(403)), .. }
        ));

        let mut missing = target.fields.clone().unwrap();
        missing.remove("x-amz-server-side-encryption");
        assert!(sim
            .put(ObjectRef::Chunk(0), &target.url, &missing, b"x".to_vec())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_expired_url() {
        let sim = SimulatedBackend::new().unwrap();
        let resp = sim.presign(&presign_req(&["aa"])).await.unwrap();
        sim.expire_presigned_urls();

        let target = &resp.presigned[0];
        let err = sim
            .put(ObjectRef::Chunk(0), &target.url, target.fields.as_ref().unwrap(), vec![1])
            .await
            .unwrap_err();
        assert!(matches!(err, DropError::PresignedUrlExpired { target: ObjectRef::Chunk(0) }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_grants_are_pruned() {
        let sim = SimulatedBackend::new().unwrap();
        sim.presign(&presign_req(&["aa", "bb"])).await.unwrap();
        assert_eq!(sim.state().grants.len(), 3);

        sim.expire_presigned_urls();
        sim.presign(&presign_req(&["cc"])).await.unwrap();
        assert_eq!(sim.state().grants.len(), 5, "recently expired grants still answer");

        tokio::time::advance(EXPIRED_GRANT_RETENTION + Duration::from_secs(900)).await;
        let resp = sim.presign(&presign_req(&["dd"])).await.unwrap();
        assert_eq!(sim.state().grants.len(), 2);

        let target = &resp.presigned[0];
        sim.put(ObjectRef::Chunk(0), &target.url, target.fields.as_ref().unwrap(), vec![1])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_not_ready_until_finalized() {
        let sim = SimulatedBackend::new().unwrap();
        let resp = sim.presign(&presign_req(&["aa"])).await.unwrap();
        assert!(matches!(sim.get_drop(&resp.drop_id).await, Err(DropError::NotReady(_))));
        assert!(matches!(sim.get_drop("nope").await, Err(DropError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_finalize_requires_manifest() {
        let sim = SimulatedBackend::new().unwrap();
        let resp = sim.presign(&presign_req(&["aa"])).await.unwrap();
        let err = sim
            .finalize(&FinalizeRequest {
                drop_id: resp.drop_id.clone(),
                manifest_s3_key: resp.manifest_presigned.unwrap().key,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DropError::Backend { status: HttpStatus(Some(400)), .. }));
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let sim = SimulatedBackend::new().unwrap();
        let resp = sim.presign(&presign_req(&["aa", "bb"])).await.unwrap();
        upload_all(&sim, &resp).await;

        let fin = sim
            .finalize(&FinalizeRequest {
                drop_id: resp.drop_id.clone(),
                manifest_s3_key: resp.manifest_presigned.clone().unwrap().key,
            })
            .await
            .unwrap();
        assert_eq!(fin.short_code.as_str().len(), 6);

        // lookup is case-insensitive
        let lower = ShortCode::parse(&fin.short_code.as_str().to_lowercase()).unwrap();
        let resolved = sim.resolve_short_code(&lower).await.unwrap();
        assert_eq!(resolved.drop_id, resp.drop_id);
        assert_eq!(resolved.status, "ready");

        let drop = sim.get_drop(&resp.drop_id).await.unwrap();
        assert_eq!(drop.chunks.len(), 2);
        let body = sim.get(ObjectRef::Chunk(0), &drop.chunks[0].url).await.unwrap();
        assert_eq!(body, b"data");

        sim.log_pickup(
            &resp.drop_id,
            &PickupRequest {
                client_time: 1,
                user_agent_redacted: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(sim.pickups(&resp.drop_id).len(), 1);

        let burned = sim
            .burn_drop(&resp.drop_id, &BurnRequest { reason: None })
            .await
            .unwrap();
        assert_eq!(burned.status, "burning");
        assert_eq!(sim.drop_status(&resp.drop_id), Some("deleted"));
        assert!(!sim.object_exists(&drop.chunks[0].key).await.unwrap());
        assert!(sim.get(ObjectRef::Chunk(0), &drop.chunks[0].url).await.is_err());
    }

    #[tokio::test]
    async fn test_unsigned_mode_expects_content_type_only() {
        let sim = SimulatedBackend::with_options(SimulatedOptions {
            signed_fields: false,
            ..Default::default()
        })
        .unwrap();
        let resp = sim.presign(&presign_req(&["aa"])).await.unwrap();
        assert!(resp.presigned[0].fields.is_none());

        let headers = crate::transport::upload_headers(None, CHUNK_CONTENT_TYPE);
        sim.put(ObjectRef::Chunk(0), &resp.presigned[0].url, &headers, vec![0])
            .await
            .unwrap();
    }

    #[test]
    fn test_short_code_alphabet() {
        for _ in 0..100 {
            let code = generate_short_code().unwrap();
            assert!(code
                .as_str()
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));
        }
    }
}
