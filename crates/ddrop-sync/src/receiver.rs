//! Receiver pipeline: short code → drop → chunks → verify → decrypt →
//! assemble → pickup report → optional burn countdown.
//!
//! Chunks are fetched `concurrency` at a time but appended strictly in
//! manifest order. The payload is written to a uniquely named temp file in
//! the destination directory and persisted only after every check has
//! passed, so a failed pickup never leaves a partial file behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use ddrop_chunks::{extract_bundle, verify_chunk, StreamHasher};
use ddrop_core::api::{DropResponse, PickupRequest, ShortCodeResponse};
use ddrop_core::types::ReceivePhase;
use ddrop_core::{DropError, DropResult, FileEntry, Manifest, ObjectRef, ShortCode};
use ddrop_crypto::{decrypt_chunk, ChunkIv, DropKeys, DropSecret};
use ddrop_transfer::{DropBackend, ObjectTransport};
use futures::stream::{self, StreamExt};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::burn::{schedule_burn, BurnCountdown};
use crate::engine::{run_blocking, ReceiveHooks, ReceiveOptions};
use crate::manifest::check_drop;

/// Upper bound on the user agent sent with a pickup report
pub const MAX_USER_AGENT_LEN: usize = 200;

const TMP_SUFFIX: &str = ".ddrop_tmp";
const FALLBACK_NAME: &str = "deaddrop_download";

/// What a completed download produced
#[derive(Debug, Clone)]
pub struct DownloadResult {
    /// The assembled payload, or the extraction directory for unpacked bundles
    pub path: PathBuf,
    /// Plaintext bytes written
    pub bytes: u64,
    pub chunks: usize,
    /// Files unpacked from a bundle, when extraction was requested
    pub extracted: Option<Vec<FileEntry>>,
}

#[derive(Debug)]
pub struct PickupOutcome {
    pub drop_id: String,
    pub manifest: Manifest,
    pub download: DownloadResult,
    /// Running countdown for burn-after-read drops
    pub burn: Option<BurnCountdown>,
}

/// Resolve a user-entered short code. Case and surrounding whitespace are
/// ignored.
pub async fn resolve(backend: &dyn DropBackend, code: &str) -> DropResult<ShortCodeResponse> {
    let code = ShortCode::parse(code)?;
    let resp = backend.resolve_short_code(&code).await?;
    debug!(short_code = %code, drop_id = %resp.drop_id, status = %resp.status, "resolved");
    Ok(resp)
}

/// Statuses under which a resolved drop may still be picked up. `uploading`
/// is passed on so `load_manifest` can wait for finalization.
const PICKABLE_STATUSES: [&str; 2] = ["ready", "uploading"];

/// Reject drops that are burned, burning or otherwise gone for good.
fn check_resolved(resp: &ShortCodeResponse) -> DropResult<()> {
    if PICKABLE_STATUSES.contains(&resp.status.as_str()) {
        Ok(())
    } else {
        Err(DropError::NotFound(format!("drop {} is {}", resp.drop_id, resp.status)))
    }
}

/// Fetch a drop's manifest and download list, retrying while the backend
/// still reports the drop as not ready.
pub async fn load_manifest(
    backend: &dyn DropBackend,
    drop_id: &str,
    opts: &ReceiveOptions,
) -> DropResult<DropResponse> {
    let mut attempt = 0;
    loop {
        match backend.get_drop(drop_id).await {
            Ok(drop) => {
                check_drop(&drop)?;
                return Ok(drop);
            }
            Err(DropError::NotReady(msg)) if attempt < opts.not_ready_retries => {
                attempt += 1;
                warn!(drop_id, attempt, %msg, "drop not ready, retrying");
                tokio::time::sleep(opts.not_ready_delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Strip any directory components and reserved names from a manifest
/// filename.
pub fn sanitize_filename(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        cleaned
    }
}

/// First free path for `name` in `dir`: `name`, then `stem (1).ext`, ...
fn available_path(dir: &Path, name: &str) -> PathBuf {
    let first = dir.join(name);
    if !first.exists() {
        return first;
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((s, e)) if !s.is_empty() => (s, Some(e)),
        _ => (name, None),
    };
    (1..)
        .map(|n| match ext {
            Some(ext) => dir.join(format!("{stem} ({n}).{ext}")),
            None => dir.join(format!("{stem} ({n})")),
        })
        .find(|p| !p.exists())
        .unwrap_or(first)
}

/// Nonce of every chunk, or `None` for a legacy plaintext drop.
fn chunk_ivs(manifest: &Manifest) -> DropResult<Option<Vec<ChunkIv>>> {
    let encrypted = manifest.encryption.is_some() || manifest.chunks.iter().any(|c| c.iv.is_some());
    if !encrypted {
        return Ok(None);
    }
    manifest
        .chunks
        .iter()
        .enumerate()
        .map(|(i, rec)| {
            let target = ObjectRef::Chunk(i as u64);
            match &rec.iv {
                Some(iv) => ChunkIv::from_base64(target, iv),
                None => Err(DropError::integrity(target, "encrypted drop has a chunk without a nonce")),
            }
        })
        .collect::<DropResult<Vec<_>>>()
        .map(Some)
}

/// Download, verify and assemble a ready drop into `dest_dir`.
///
/// Every chunk's ciphertext hash is checked before decryption; decryption
/// itself authenticates the chunk and its position. Nothing is left in
/// `dest_dir` unless the whole payload checks out.
pub async fn download_drop(
    transport: &dyn ObjectTransport,
    drop: &DropResponse,
    keys: Option<&DropKeys>,
    dest_dir: &Path,
    opts: &ReceiveOptions,
    hooks: &ReceiveHooks<'_>,
) -> DropResult<DownloadResult> {
    check_drop(drop)?;
    let manifest = &drop.manifest;
    let ivs = chunk_ivs(manifest)?;
    if ivs.is_some() && keys.is_none() {
        return Err(DropError::InvalidSecret(
            "drop is encrypted and no secret was provided".into(),
        ));
    }

    tokio::fs::create_dir_all(dest_dir)
        .await
        .map_err(|e| DropError::io(format!("creating {}", dest_dir.display()), e))?;
    let name = sanitize_filename(&manifest.meta.filename);
    // removed on drop unless persisted
    let tmp = tempfile::Builder::new()
        .prefix(".")
        .suffix(TMP_SUFFIX)
        .tempfile_in(dest_dir)
        .map_err(|e| DropError::io(format!("creating temp file in {}", dest_dir.display()), e))?;

    hooks.phase(ReceivePhase::Downloading);
    let bytes = write_payload(transport, drop, ivs.as_deref(), keys, &tmp, opts, hooks).await?;

    hooks.phase(ReceivePhase::Assembling);
    let final_path = persist(tmp, dest_dir, &name)?;

    let mut result = DownloadResult {
        path: final_path,
        bytes,
        chunks: manifest.chunks.len(),
        extracted: None,
    };

    if opts.extract && manifest.is_zip() {
        let archive = result.path.clone();
        let stem = archive
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| FALLBACK_NAME.to_string());
        let out_dir = available_path(dest_dir, &stem);
        let files = extract_bundle(&archive, &out_dir)?;
        tokio::fs::remove_file(&archive)
            .await
            .map_err(|e| DropError::io(format!("removing {}", archive.display()), e))?;
        result.path = out_dir;
        result.extracted = Some(files);
    }

    hooks.phase(ReceivePhase::Downloaded);
    info!(
        drop_id = %drop.drop_id,
        path = %result.path.display(),
        bytes = result.bytes,
        chunks = result.chunks,
        "drop downloaded"
    );
    Ok(result)
}

/// Move the verified temp file to the first free name for `name`, never
/// replacing an existing file.
fn persist(mut tmp: NamedTempFile, dest_dir: &Path, name: &str) -> DropResult<PathBuf> {
    loop {
        let path = available_path(dest_dir, name);
        match tmp.persist_noclobber(&path) {
            Ok(_) => return Ok(path),
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => tmp = e.file,
            Err(e) => {
                return Err(DropError::io(format!("moving payload to {}", path.display()), e.error))
            }
        }
    }
}

async fn write_payload(
    transport: &dyn ObjectTransport,
    resp: &DropResponse,
    ivs: Option<&[ChunkIv]>,
    keys: Option<&DropKeys>,
    tmp: &NamedTempFile,
    opts: &ReceiveOptions,
    hooks: &ReceiveHooks<'_>,
) -> DropResult<u64> {
    let manifest = &resp.manifest;
    let iterations = manifest
        .encryption
        .as_ref()
        .map_or(opts.pbkdf2_iterations, |e| e.iterations);
    let total_chunks = manifest.chunks.len();
    let total_bytes = manifest.meta.size;
    let tmp_path = tmp.path();

    let file = tmp
        .reopen()
        .map_err(|e| DropError::io(format!("opening {}", tmp_path.display()), e))?;
    let mut out = tokio::fs::File::from_std(file);
    let mut payload = StreamHasher::new();
    let mut written = 0u64;

    let mut fetches = stream::iter(resp.chunks.iter().enumerate())
        .map(move |(i, dl)| async move {
            transport
                .get(ObjectRef::Chunk(i as u64), &dl.url)
                .await
                .map(|body| (i, body))
        })
        .buffered(opts.concurrency.max(1));

    while let Some(fetched) = fetches.next().await {
        hooks.check_cancelled()?;
        let (i, body) = fetched?;
        let target = ObjectRef::Chunk(i as u64);
        let rec = manifest.chunks.get(i).ok_or_else(|| {
            DropError::InvalidResponse(format!("download {i} has no manifest chunk"))
        })?;

        if body.len() as u64 != rec.size {
            return Err(DropError::integrity(
                target,
                format!("size mismatch: expected {}, got {}", rec.size, body.len()),
            ));
        }
        verify_chunk(target, &body, &rec.hash)?;

        let plain = match (ivs, keys) {
            (Some(ivs), Some(keys)) => {
                let iv = *ivs
                    .get(i)
                    .ok_or_else(|| DropError::integrity(target, "chunk has no nonce"))?;
                let keys = keys.clone();
                run_blocking(move || {
                    let key = keys.chunk_key(i as u64, iterations)?;
                    decrypt_chunk(&key, &iv, &body)
                })
                .await?
            }
            _ => body,
        };

        payload.update(&plain);
        out.write_all(&plain)
            .await
            .map_err(|e| DropError::io(format!("writing {}", tmp_path.display()), e))?;
        written += plain.len() as u64;
        hooks.progress(written, total_bytes, &format!("chunk {}/{total_chunks}", i + 1));
    }

    out.flush()
        .await
        .map_err(|e| DropError::io(format!("flushing {}", tmp_path.display()), e))?;
    out.sync_all()
        .await
        .map_err(|e| DropError::io(format!("syncing {}", tmp_path.display()), e))?;
    drop(out);

    hooks.phase(ReceivePhase::Verifying);
    if written != manifest.meta.size {
        return Err(DropError::integrity(
            ObjectRef::Payload,
            format!("assembled {written} bytes, manifest says {}", manifest.meta.size),
        ));
    }
    if let Some(expected) = &manifest.payload_sha256 {
        let actual = payload.finalize_hex();
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(DropError::integrity(
                ObjectRef::Payload,
                format!("payload digest mismatch: expected {expected}, got {actual}"),
            ));
        }
    }
    Ok(written)
}

/// Tell the backend a pickup happened. Failures are logged and swallowed.
pub async fn report_pickup(backend: &dyn DropBackend, drop_id: &str, user_agent: Option<&str>) {
    let req = PickupRequest {
        client_time: Utc::now().timestamp_millis(),
        user_agent_redacted: user_agent.map(|ua| ua.chars().take(MAX_USER_AGENT_LEN).collect()),
    };
    if let Err(e) = backend.log_pickup(drop_id, &req).await {
        warn!(drop_id, error = %e, "pickup report failed");
    }
}

/// Parameters of one pickup besides the collaborators
#[derive(Debug, Clone, Copy)]
pub struct PickupArgs<'a> {
    pub code: &'a str,
    pub secret: Option<&'a DropSecret>,
    pub dest_dir: &'a Path,
    pub user_agent: Option<&'a str>,
}

/// Full receiver flow for a short code.
///
/// For burn-after-read drops the returned outcome carries a running
/// countdown; the drop is burned when it elapses unless cancelled.
pub async fn pickup_drop(
    backend: Arc<dyn DropBackend>,
    transport: &dyn ObjectTransport,
    args: PickupArgs<'_>,
    opts: &ReceiveOptions,
    hooks: &ReceiveHooks<'_>,
) -> DropResult<PickupOutcome> {
    let code = ShortCode::parse(args.code)?;
    let keys = args.secret.map(DropSecret::keys).transpose()?;
    hooks.phase(ReceivePhase::CodeEntered);

    hooks.phase(ReceivePhase::Resolving);
    let resolved = backend.resolve_short_code(&code).await?;
    check_resolved(&resolved)?;
    let drop = load_manifest(backend.as_ref(), &resolved.drop_id, opts).await?;
    hooks.phase(ReceivePhase::ManifestLoaded);
    hooks.check_cancelled()?;

    let download = download_drop(transport, &drop, keys.as_ref(), args.dest_dir, opts, hooks).await?;
    report_pickup(backend.as_ref(), &drop.drop_id, args.user_agent).await;

    let burn = if drop.manifest.burn_after_read() {
        hooks.phase(ReceivePhase::BurnCountdown);
        info!(drop_id = %drop.drop_id, secs = opts.burn_countdown.as_secs(), "burn countdown started");
        Some(schedule_burn(backend, &drop.drop_id, opts.burn_countdown))
    } else {
        None
    };

    Ok(PickupOutcome {
        drop_id: drop.drop_id,
        manifest: drop.manifest,
        download,
        burn,
    })
}
