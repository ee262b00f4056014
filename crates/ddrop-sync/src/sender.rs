//! Sender pipeline: files → bundle → chunks → encrypt → presign → upload →
//! manifest → finalize.
//!
//! The payload is walked twice. Pass one derives every chunk's key and
//! nonce, encrypts, and hashes the ciphertext so the backend can presign
//! targets by hash. Pass two re-reads the payload, re-encrypts with the same
//! key and nonce (AES-GCM is deterministic for those) and uploads. Only
//! `concurrency` chunks are held in memory at any point. Key derivation,
//! encryption and hashing run on the blocking pool.

use std::path::PathBuf;
use std::sync::Arc;

use ddrop_chunks::{
    build_bundle, hash_hex, select_files, validate_selection, Bundle, BundleEvent, BundleProgressFn,
    FixedChunker, SelectedFile, StreamHasher,
};
use ddrop_core::api::{ChunkInfo, FinalizeRequest, PresignMeta, PresignRequest, PresignResponse};
use ddrop_core::types::SendPhase;
use ddrop_core::{ChunkRecord, DropError, DropResult, Manifest, ObjectRef, ShortCode};
use ddrop_crypto::{encrypt_chunk, encryption_meta, initialize_drop, ChunkIv, ChunkKey, DropKeys, DropSecret};
use ddrop_transfer::{upload_headers, DropBackend, ObjectTransport, CHUNK_CONTENT_TYPE, MANIFEST_CONTENT_TYPE};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info};

use crate::engine::{run_blocking, SendHooks, SendOptions};
use crate::manifest::{build_manifest, check_presign, PlannedChunk};

/// Result of a finalized drop
#[derive(Debug)]
pub struct SendResult {
    pub drop_id: String,
    pub short_code: ShortCode,
    /// Hand this to the receiver out of band; it never reaches the backend.
    pub secret: DropSecret,
    pub manifest_key: String,
    pub manifest: Manifest,
    /// Ciphertext bytes uploaded, manifest excluded
    pub bytes_uploaded: u64,
}

/// Key and nonce of one chunk, kept between the two passes
struct ChunkMaterial {
    key: ChunkKey,
    iv: ChunkIv,
}

/// Send `paths` as one drop.
///
/// Any failure before `Finalized` is terminal: nothing is resumed and the
/// caller starts over. Cancellation is honoured until the manifest upload.
pub async fn send_drop(
    backend: &dyn DropBackend,
    transport: Arc<dyn ObjectTransport>,
    paths: &[PathBuf],
    opts: &SendOptions,
    hooks: &SendHooks<'_>,
) -> DropResult<SendResult> {
    hooks.phase(SendPhase::Idle);

    let files = select_files(paths)?;
    let entries: Vec<_> = files.iter().map(|f| f.entry()).collect();
    validate_selection(&entries, &opts.limits)?;
    hooks.phase(SendPhase::FilesSelected);

    let bundle = if files.len() > 1 {
        hooks.phase(SendPhase::Bundling);
        let on_event: &BundleProgressFn<'_> = &|ev| report_bundling(&files, hooks, ev);
        build_bundle(&files, &opts.limits, Some(on_event))?
    } else {
        build_bundle(&files, &opts.limits, None)?
    };
    hooks.check_cancelled()?;

    let keys = initialize_drop()?;
    hooks.phase(SendPhase::MasterKeyInitialized);

    let (planned, material, payload_sha256) = plan_chunks(&bundle, &keys, opts, hooks).await?;
    hooks.check_cancelled()?;

    hooks.phase(SendPhase::PresignRequested);
    let req = PresignRequest {
        chunks: planned
            .iter()
            .map(|p| ChunkInfo {
                hash: p.hash.clone(),
                size: p.size,
            })
            .collect(),
        meta: PresignMeta {
            size: bundle.size(),
            files: bundle.original_files().to_vec(),
            burn_after_secs: opts.burn_schedule.map(|b| b.duration().as_secs()),
            burn_after_read: Some(opts.burn_after_read),
        },
    };
    let resp = backend.presign(&req).await?;
    let manifest_target = check_presign(&resp, &planned)?.clone();
    debug!(drop_id = %resp.drop_id, targets = resp.presigned.len(), "presigned");

    hooks.phase(SendPhase::ChunksUploading);
    let records = upload_chunks(transport.clone(), &bundle, &resp, &planned, &material, opts, hooks).await?;
    drop(material);
    let bytes_uploaded: u64 = records.iter().map(|r| r.size).sum();
    hooks.phase(SendPhase::ChunksUploaded);

    // last point at which the drop can be abandoned
    hooks.check_cancelled()?;

    let manifest = build_manifest(
        &bundle,
        records,
        opts.burn_after_read,
        encryption_meta(opts.pbkdf2_iterations, opts.chunk_size),
        payload_sha256,
    );
    hooks.phase(SendPhase::ManifestUploading);
    transport
        .put(
            ObjectRef::Manifest,
            &manifest_target.url,
            &upload_headers(manifest_target.fields.as_ref(), MANIFEST_CONTENT_TYPE),
            manifest.to_bytes()?,
        )
        .await?;
    hooks.phase(SendPhase::ManifestUploaded);

    let fin = backend
        .finalize(&FinalizeRequest {
            drop_id: resp.drop_id.clone(),
            manifest_s3_key: manifest_target.key.clone(),
        })
        .await?;
    if fin.drop_id != resp.drop_id {
        return Err(DropError::InvalidResponse(format!(
            "finalize answered for drop {}, expected {}",
            fin.drop_id, resp.drop_id
        )));
    }
    hooks.phase(SendPhase::Finalized);

    info!(
        drop_id = %fin.drop_id,
        short_code = %fin.short_code,
        chunks = manifest.chunks.len(),
        bytes = bundle.size(),
        uploaded_bytes = bytes_uploaded,
        is_zip = bundle.is_zip(),
        "drop finalized"
    );

    Ok(SendResult {
        drop_id: fin.drop_id,
        short_code: fin.short_code,
        secret: keys.to_secret(),
        manifest_key: manifest_target.key,
        manifest,
        bytes_uploaded,
    })
}

/// Forward archive progress as input bytes archived so far.
fn report_bundling(files: &[SelectedFile], hooks: &SendHooks<'_>, ev: BundleEvent) {
    let total: u64 = files.iter().map(|f| f.size).sum();
    match ev {
        BundleEvent::FileAdded { index, total: n, name } => {
            let done: u64 = files.iter().take(index + 1).map(|f| f.size).sum();
            hooks.progress(done, total, &format!("bundled {name} ({}/{n})", index + 1));
        }
        BundleEvent::Completed { .. } => hooks.progress(total, total, "bundle complete"),
    }
}

/// Pass one: derive, encrypt and hash every chunk without keeping any
/// ciphertext around.
async fn plan_chunks(
    bundle: &Bundle,
    keys: &DropKeys,
    opts: &SendOptions,
    hooks: &SendHooks<'_>,
) -> DropResult<(Vec<PlannedChunk>, Vec<Arc<ChunkMaterial>>, Option<String>)> {
    let mut planned = Vec::new();
    let mut material = Vec::new();
    let mut payload = opts.payload_digest.then(StreamHasher::new);
    let iterations = opts.pbkdf2_iterations;

    for chunk in FixedChunker::new(bundle.open()?, opts.chunk_size)? {
        hooks.check_cancelled()?;
        let chunk = chunk?;
        if let Some(h) = payload.as_mut() {
            h.update(&chunk.data);
        }

        let index = chunk.index;
        let keys = keys.clone();
        let (mat, hash, size) = run_blocking(move || {
            let key = keys.chunk_key(index, iterations)?;
            let iv = ChunkIv::generate(index)?;
            let ciphertext = encrypt_chunk(&key, &iv, &chunk.data)?;
            Ok((ChunkMaterial { key, iv }, hash_hex(&ciphertext), ciphertext.len() as u64))
        })
        .await?;

        planned.push(PlannedChunk {
            index,
            iv: mat.iv.to_base64(),
            hash,
            size,
        });
        material.push(Arc::new(mat));
    }

    debug!(chunks = planned.len(), "payload planned");
    Ok((planned, material, payload.map(StreamHasher::finalize_hex)))
}

async fn acquire(semaphore: &Arc<Semaphore>, hooks: &SendHooks<'_>) -> DropResult<OwnedSemaphorePermit> {
    let permit = match &hooks.cancel {
        Some(token) => tokio::select! {
            _ = token.cancelled() => return Err(DropError::Cancelled),
            p = semaphore.clone().acquire_owned() => p,
        },
        None => semaphore.clone().acquire_owned().await,
    };
    permit.map_err(|_| DropError::Cancelled)
}

type UploadOutcome = Result<DropResult<(usize, ChunkRecord)>, JoinError>;

/// Accumulates finished uploads in index order, whatever order they finish in.
struct Confirmed<'h, 'a> {
    records: Vec<Option<ChunkRecord>>,
    done_bytes: u64,
    total_bytes: u64,
    hooks: &'h SendHooks<'a>,
}

impl Confirmed<'_, '_> {
    fn accept(&mut self, outcome: UploadOutcome) -> DropResult<()> {
        let (index, record) = match outcome {
            Ok(result) => result?,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => return Err(DropError::Cancelled),
        };
        self.done_bytes += record.size;
        let n = self.records.len();
        self.hooks
            .progress(self.done_bytes, self.total_bytes, &format!("chunk {}/{n}", index + 1));
        self.records[index] = Some(record);
        Ok(())
    }
}

/// Pass two: reproduce each ciphertext and PUT it, `concurrency` at a time.
async fn upload_chunks(
    transport: Arc<dyn ObjectTransport>,
    bundle: &Bundle,
    resp: &PresignResponse,
    planned: &[PlannedChunk],
    material: &[Arc<ChunkMaterial>],
    opts: &SendOptions,
    hooks: &SendHooks<'_>,
) -> DropResult<Vec<ChunkRecord>> {
    let semaphore = Arc::new(Semaphore::new(opts.concurrency.max(1)));
    let mut tasks: JoinSet<DropResult<(usize, ChunkRecord)>> = JoinSet::new();
    let mut confirmed = Confirmed {
        records: vec![None; planned.len()],
        done_bytes: 0,
        total_bytes: planned.iter().map(|p| p.size).sum(),
        hooks,
    };
    let mut seen = 0usize;

    for chunk in FixedChunker::new(bundle.open()?, opts.chunk_size)? {
        let chunk = chunk?;
        let index = chunk.index as usize;
        seen += 1;
        hooks.check_cancelled()?;

        let (Some(plan), Some(mat), Some(target)) =
            (planned.get(index), material.get(index), resp.presigned.get(index))
        else {
            return Err(DropError::integrity(ObjectRef::Payload, "payload grew while sending"));
        };

        let mat = Arc::clone(mat);
        let data = chunk.data;
        let (ciphertext, hash) = run_blocking(move || {
            let ciphertext = encrypt_chunk(&mat.key, &mat.iv, &data)?;
            let hash = hash_hex(&ciphertext);
            Ok((ciphertext, hash))
        })
        .await?;
        if hash != plan.hash {
            return Err(DropError::integrity(
                ObjectRef::Chunk(index as u64),
                "payload changed while sending",
            ));
        }

        let permit = acquire(&semaphore, hooks).await?;
        while let Some(outcome) = tasks.try_join_next() {
            confirmed.accept(outcome)?;
        }

        let record = ChunkRecord {
            key: target.key.clone(),
            size: ciphertext.len() as u64,
            hash,
            iv: Some(plan.iv.clone()),
        };
        let headers = upload_headers(target.fields.as_ref(), CHUNK_CONTENT_TYPE);
        let url = target.url.clone();
        let transport = transport.clone();
        tasks.spawn(async move {
            let _permit = permit; // released when the upload completes
            transport
                .put(ObjectRef::Chunk(index as u64), &url, &headers, ciphertext)
                .await
                .map(|()| (index, record))
        });
    }

    if seen != planned.len() {
        return Err(DropError::integrity(ObjectRef::Payload, "payload shrank while sending"));
    }

    while let Some(outcome) = tasks.join_next().await {
        confirmed.accept(outcome)?;
    }

    confirmed
        .records
        .into_iter()
        .enumerate()
        .map(|(i, r)| {
            r.ok_or_else(|| DropError::integrity(ObjectRef::Chunk(i as u64), "upload never confirmed"))
        })
        .collect()
}
