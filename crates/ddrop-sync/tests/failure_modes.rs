//! Integration test: how the lifecycle fails
//!
//! Tampered chunks, wrong or missing secrets, expired and mis-signed
//! presigned URLs, not-ready drops, cancellation and input validation.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ddrop_core::api::{
    BurnRequest, BurnResponse, DropResponse, FieldMap, FinalizeRequest, FinalizeResponse,
    PickupRequest, PresignRequest, PresignResponse, ShortCodeResponse,
};
use ddrop_core::config::MIN_PBKDF2_ITERATIONS;
use ddrop_core::types::SendPhase;
use ddrop_core::{DropError, DropResult, HttpStatus, ObjectRef, ShortCode};
use ddrop_sync::{
    load_manifest, pickup_drop, send_drop, PhaseFn, PickupArgs, ReceiveHooks, ReceiveOptions,
    SendHooks, SendOptions, SendResult,
};
use ddrop_transfer::{DropBackend, ObjectTransport, SimulatedBackend, SimulatedOptions};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn write_test_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("write test file");
    path
}

fn send_opts() -> SendOptions {
    SendOptions {
        chunk_size: 64 * 1024,
        pbkdf2_iterations: MIN_PBKDF2_ITERATIONS,
        ..SendOptions::default()
    }
}

fn recv_opts() -> ReceiveOptions {
    ReceiveOptions {
        pbkdf2_iterations: MIN_PBKDF2_ITERATIONS,
        not_ready_delay: Duration::from_millis(1),
        ..ReceiveOptions::default()
    }
}

async fn send_file(backend: &Arc<SimulatedBackend>, dir: &Path, len: usize) -> SendResult {
    let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    let src = write_test_file(dir, "payload.bin", &data);
    send_drop(
        &**backend,
        backend.clone(),
        &[src],
        &send_opts(),
        &SendHooks::default(),
    )
    .await
    .expect("send should succeed")
}

async fn pickup(
    backend: &Arc<SimulatedBackend>,
    sent: &SendResult,
    secret: Option<&ddrop_crypto::DropSecret>,
    out: &Path,
) -> DropResult<ddrop_sync::PickupOutcome> {
    pickup_drop(
        backend.clone(),
        &**backend,
        PickupArgs {
            code: sent.short_code.as_str(),
            secret,
            dest_dir: out,
            user_agent: None,
        },
        &recv_opts(),
        &ReceiveHooks::default(),
    )
    .await
}

fn dir_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir).map_or(true, |mut entries| entries.next().is_none())
}

#[tokio::test]
async fn tampered_chunk_is_rejected_and_nothing_is_written() {
    let tmp = TempDir::new().unwrap();
    let backend = Arc::new(SimulatedBackend::new().unwrap());
    let sent = send_file(&backend, tmp.path(), 200_000).await;
    assert_eq!(sent.manifest.chunks.len(), 4);

    let victim = &sent.manifest.chunks[1];
    let mut stored = backend.read_object(&victim.key).await.unwrap();
    stored[100] ^= 0x01;
    backend.overwrite_object(&victim.key, stored).await.unwrap();

    let out = tmp.path().join("out");
    let err = pickup(&backend, &sent, Some(&sent.secret), &out).await.unwrap_err();
    assert!(
        matches!(err, DropError::IntegrityViolation { target: ObjectRef::Chunk(1), .. }),
        "got {err:?}"
    );
    assert!(dir_is_empty(&out), "no partial output may remain");
    assert!(backend.pickups(&sent.drop_id).is_empty());
}

#[tokio::test]
async fn wrong_secret_fails_authentication() {
    let tmp = TempDir::new().unwrap();
    let backend = Arc::new(SimulatedBackend::new().unwrap());
    let sent = send_file(&backend, tmp.path(), 1000).await;
    let other = send_file(&backend, tmp.path(), 1000).await;

    let out = tmp.path().join("out");
    let err = pickup(&backend, &sent, Some(&other.secret), &out).await.unwrap_err();
    assert!(matches!(err, DropError::IntegrityViolation { target: ObjectRef::Chunk(0), .. }));
    assert!(dir_is_empty(&out));
}

#[tokio::test]
async fn missing_secret_is_refused_before_download() {
    let tmp = TempDir::new().unwrap();
    let backend = Arc::new(SimulatedBackend::new().unwrap());
    let sent = send_file(&backend, tmp.path(), 1000).await;

    let out = tmp.path().join("out");
    let err = pickup(&backend, &sent, None, &out).await.unwrap_err();
    assert!(matches!(err, DropError::InvalidSecret(_)));
    assert!(dir_is_empty(&out));
}

#[tokio::test]
async fn expired_upload_url_requires_restart() {
    let tmp = TempDir::new().unwrap();
    let backend = Arc::new(
        SimulatedBackend::with_options(SimulatedOptions {
            upload_ttl: Duration::ZERO,
            ..SimulatedOptions::default()
        })
        .unwrap(),
    );
    let src = write_test_file(tmp.path(), "late.bin", b"too slow");

    let err = send_drop(
        &*backend,
        backend.clone(),
        &[src],
        &send_opts(),
        &SendHooks::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, DropError::PresignedUrlExpired { target: ObjectRef::Chunk(0) }));
    assert!(err.requires_restart());
}

/// Forwards to the simulator but keeps only `Content-Type` on uploads
struct StrippingTransport(Arc<SimulatedBackend>);

#[async_trait]
impl ObjectTransport for StrippingTransport {
    async fn put(
        &self,
        target: ObjectRef,
        url: &str,
        headers: &FieldMap,
        body: Vec<u8>,
    ) -> DropResult<()> {
        let stripped: FieldMap = headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("content-type"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.0.put(target, url, &stripped, body).await
    }

    async fn get(&self, target: ObjectRef, url: &str) -> DropResult<Vec<u8>> {
        self.0.get(target, url).await
    }
}

#[tokio::test]
async fn missing_signed_header_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let backend = Arc::new(SimulatedBackend::new().unwrap());
    let src = write_test_file(tmp.path(), "x.bin", b"signed fields matter");

    let err = send_drop(
        &*backend,
        Arc::new(StrippingTransport(backend.clone())),
        &[src],
        &send_opts(),
        &SendHooks::default(),
    )
    .await
    .unwrap_err();
    match err {
        DropError::UploadRejected { target, status, .. } => {
            assert_eq!(target, ObjectRef::Chunk(0));
            assert_eq!(status, HttpStatus(Some(403)));
        }
        other => panic!("expected UploadRejected, got {other:?}"),
    }
}

/// Answers `NotReady` for the first `not_ready` lookups of a drop
struct SlowFinalizeBackend {
    inner: Arc<SimulatedBackend>,
    not_ready: AtomicU32,
}

#[async_trait]
impl DropBackend for SlowFinalizeBackend {
    async fn presign(&self, req: &PresignRequest) -> DropResult<PresignResponse> {
        self.inner.presign(req).await
    }

    async fn finalize(&self, req: &FinalizeRequest) -> DropResult<FinalizeResponse> {
        self.inner.finalize(req).await
    }

    async fn resolve_short_code(&self, code: &ShortCode) -> DropResult<ShortCodeResponse> {
        self.inner.resolve_short_code(code).await
    }

    async fn get_drop(&self, drop_id: &str) -> DropResult<DropResponse> {
        let left = self.not_ready.load(Ordering::SeqCst);
        if left > 0 {
            self.not_ready.store(left - 1, Ordering::SeqCst);
            return Err(DropError::NotReady(format!("drop {drop_id} is uploading")));
        }
        self.inner.get_drop(drop_id).await
    }

    async fn log_pickup(&self, drop_id: &str, req: &PickupRequest) -> DropResult<()> {
        self.inner.log_pickup(drop_id, req).await
    }

    async fn burn_drop(&self, drop_id: &str, req: &BurnRequest) -> DropResult<BurnResponse> {
        self.inner.burn_drop(drop_id, req).await
    }
}

#[tokio::test]
async fn not_ready_drop_is_retried_up_to_the_limit() {
    let tmp = TempDir::new().unwrap();
    let sim = Arc::new(SimulatedBackend::new().unwrap());
    let sent = send_file(&sim, tmp.path(), 1000).await;

    let backend = SlowFinalizeBackend {
        inner: sim.clone(),
        not_ready: AtomicU32::new(2),
    };
    let drop = load_manifest(&backend, &sent.drop_id, &recv_opts()).await.unwrap();
    assert_eq!(drop.drop_id, sent.drop_id);
    assert_eq!(drop.chunks.len(), 1);

    backend.not_ready.store(5, Ordering::SeqCst);
    let opts = ReceiveOptions {
        not_ready_retries: 1,
        ..recv_opts()
    };
    let err = load_manifest(&backend, &sent.drop_id, &opts).await.unwrap_err();
    assert!(matches!(err, DropError::NotReady(_)));
    assert_eq!(backend.not_ready.load(Ordering::SeqCst), 3, "one try plus one retry");
}

#[tokio::test]
async fn cancel_before_manifest_abandons_the_drop() {
    let tmp = TempDir::new().unwrap();
    let backend = Arc::new(SimulatedBackend::new().unwrap());
    let data = vec![7u8; 300_000];
    let src = write_test_file(tmp.path(), "c.bin", &data);

    let token = CancellationToken::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let trigger = token.clone();
    let on_phase: PhaseFn<SendPhase> = Box::new(move |p| {
        if p == SendPhase::ChunksUploaded {
            trigger.cancel();
        }
        sink.lock().unwrap().push(p);
    });

    let err = send_drop(
        &*backend,
        backend.clone(),
        &[src],
        &send_opts(),
        &SendHooks {
            on_phase: Some(&on_phase),
            progress: None,
            cancel: Some(token),
        },
    )
    .await
    .unwrap_err();

    assert!(matches!(err, DropError::Cancelled));
    let seen = seen.lock().unwrap();
    assert_eq!(seen.last(), Some(&SendPhase::ChunksUploaded));
    assert!(!seen.contains(&SendPhase::ManifestUploading));
}

#[tokio::test]
async fn empty_payload_is_rejected_by_backend() {
    let tmp = TempDir::new().unwrap();
    let backend = Arc::new(SimulatedBackend::new().unwrap());
    let src = write_test_file(tmp.path(), "empty.txt", b"");

    let err = send_drop(
        &*backend,
        backend.clone(),
        &[src],
        &send_opts(),
        &SendHooks::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, DropError::Backend { status: HttpStatus(Some(400)), .. }));
}

#[tokio::test]
async fn selection_is_validated_before_any_network_call() {
    let tmp = TempDir::new().unwrap();
    let backend = Arc::new(SimulatedBackend::new().unwrap());
    let paths: Vec<_> = (0..6)
        .map(|i| write_test_file(tmp.path(), &format!("f{i}.txt"), b"x"))
        .collect();

    let err = send_drop(
        &*backend,
        backend.clone(),
        &paths,
        &send_opts(),
        &SendHooks::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, DropError::TooManyFiles { count: 6, max: 5 }));
    assert!(err.is_validation());

    let err = send_drop(
        &*backend,
        backend.clone(),
        &[],
        &send_opts(),
        &SendHooks::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, DropError::NoFiles));
}

#[tokio::test]
async fn unknown_and_malformed_codes() {
    let tmp = TempDir::new().unwrap();
    let backend = Arc::new(SimulatedBackend::new().unwrap());
    let out = tmp.path().join("out");

    for (code, unknown) in [("ZZZZZZ", true), ("ab-1", false)] {
        let err = pickup_drop(
            backend.clone(),
            &*backend,
            PickupArgs {
                code,
                secret: None,
                dest_dir: &out,
                user_agent: None,
            },
            &recv_opts(),
            &ReceiveHooks::default(),
        )
        .await
        .unwrap_err();
        if unknown {
            assert!(matches!(err, DropError::NotFound(_)), "got {err:?}");
        } else {
            assert!(matches!(err, DropError::InvalidShortCode(_)), "got {err:?}");
        }
    }
}

#[tokio::test]
async fn cancel_while_planning_stops_before_presign() {
    let tmp = TempDir::new().unwrap();
    let backend = Arc::new(SimulatedBackend::new().unwrap());
    let src = write_test_file(tmp.path(), "p.bin", &vec![3u8; 512 * 1024]);

    let token = CancellationToken::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let trigger = token.clone();
    let on_phase: PhaseFn<SendPhase> = Box::new(move |p| {
        if p == SendPhase::MasterKeyInitialized {
            trigger.cancel();
        }
        sink.lock().unwrap().push(p);
    });

    let err = send_drop(
        &*backend,
        backend.clone(),
        &[src],
        &send_opts(),
        &SendHooks {
            on_phase: Some(&on_phase),
            progress: None,
            cancel: Some(token),
        },
    )
    .await
    .unwrap_err();

    assert!(matches!(err, DropError::Cancelled));
    let seen = seen.lock().unwrap();
    assert_eq!(seen.last(), Some(&SendPhase::MasterKeyInitialized));
    assert!(!seen.contains(&SendPhase::PresignRequested));
}

#[tokio::test]
async fn download_list_longer_than_manifest_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let backend = Arc::new(SimulatedBackend::new().unwrap());
    let sent = send_file(&backend, tmp.path(), 1000).await;

    let mut drop = backend.get_drop(&sent.drop_id).await.unwrap();
    assert_eq!(drop.chunks.len(), 1);
    let extra = drop.chunks[0].clone();
    drop.chunks.push(extra);

    let keys = sent.secret.keys().unwrap();
    let out = tmp.path().join("out");
    let err = ddrop_sync::download_drop(
        &*backend,
        &drop,
        Some(&keys),
        &out,
        &recv_opts(),
        &ReceiveHooks::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, DropError::InvalidResponse(_)), "got {err:?}");
    assert!(dir_is_empty(&out));
}
