//! Upload orchestration: key fetch, sealing, session init, chunked transfer, finalize.
//!
//! One call to [`Uploader::upload`] is one attempt. Nothing is retried here;
//! a transient failure is returned to the caller, whose next attempt starts
//! from scratch with a new envelope and a new server session.

use std::path::Path;

use tracing::{debug, info, warn};
use voxdrop_crypto::encoding::base64url_nopad;
use voxdrop_crypto::key_wrap::{parse_public_key, PublicKey};
use voxdrop_crypto::{CryptoError, DigitalEnvelope, CONTENT_ALG, WRAP_ALG};
use zeroize::Zeroizing;

use crate::api_client::{CompleteRequest, RecordingMetadata, RecordingsApi, SessionToken};
use crate::error::UploadError;
use crate::segments::{effective_chunk_size, segment_ranges};

/// Key id assumed when the server publishes a key without one.
pub const DEFAULT_KEY_ID: &str = "upl-prod-01";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    FetchingKey,
    Encrypting,
    InitiatingSession,
    TransmittingSegments,
    Finalizing,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Phase::FetchingKey => "fetching key",
            Phase::Encrypting => "encrypting",
            Phase::InitiatingSession => "initiating session",
            Phase::TransmittingSegments => "transmitting segments",
            Phase::Finalizing => "finalizing",
        })
    }
}

/// Server key material for one attempt. Never cached.
struct ServerKey {
    public_key: PublicKey,
    kid: String,
}

struct UploadSession {
    id: String,
    token: SessionToken,
    max_chunk_size: usize,
    /// Bytes of ciphertext the server has acknowledged.
    offset: usize,
}

/// What a successful attempt reports.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadReceipt {
    pub upload_id: String,
    pub status: String,
    pub snr: f64,
    pub recording_id: Option<String>,
    pub segments: usize,
    pub ciphertext_len: usize,
}

pub struct Uploader<A> {
    api: A,
}

impl<A: RecordingsApi> Uploader<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Read `path` and upload it. An unreadable source fails before any network call.
    pub async fn upload_file(
        &self,
        path: &Path,
        metadata: &RecordingMetadata,
    ) -> Result<UploadReceipt, UploadError> {
        let payload = tokio::fs::read(path)
            .await
            .map_err(|source| UploadError::SourceUnreadable {
                path: path.to_path_buf(),
                source,
            })?;
        self.upload(Zeroizing::new(payload), metadata).await
    }

    /// Run one complete attempt over `payload`.
    #[tracing::instrument(
        name = "upload",
        skip_all,
        fields(task_id = %metadata.task_id, bytes = payload.len())
    )]
    pub async fn upload(
        &self,
        payload: Zeroizing<Vec<u8>>,
        metadata: &RecordingMetadata,
    ) -> Result<UploadReceipt, UploadError> {
        let key = self.fetch_key().await?;
        let envelope = encrypt(payload).await?;
        let mut session = self.open_session(metadata, &key).await?;
        let segments = self
            .send_segments(&mut session, envelope.ciphertext())
            .await?;
        self.finalize(&session, &envelope, &key, segments).await
    }

    async fn fetch_key(&self) -> Result<ServerKey, UploadError> {
        debug!(phase = %Phase::FetchingKey, "requesting server public key");
        let published = self
            .api
            .public_key()
            .await
            .map_err(|e| UploadError::Transient {
                phase: Phase::FetchingKey,
                message: e.to_string(),
            })?;

        let public_key = parse_public_key(&published.pem)?;

        if let Some(alg) = published.alg.as_deref().filter(|alg| *alg != WRAP_ALG) {
            warn!(server_alg = alg, client_alg = WRAP_ALG, "server declares a different wrap algorithm");
        }
        if let Some(enc) = published.enc.as_deref().filter(|enc| *enc != CONTENT_ALG) {
            warn!(server_enc = enc, client_enc = CONTENT_ALG, "server declares a different content algorithm");
        }

        let kid = published.kid.unwrap_or_else(|| DEFAULT_KEY_ID.to_string());
        info!(phase = %Phase::FetchingKey, kid = %kid, "server key fetched");
        Ok(ServerKey { public_key, kid })
    }

    async fn open_session(
        &self,
        metadata: &RecordingMetadata,
        key: &ServerKey,
    ) -> Result<UploadSession, UploadError> {
        let init = self
            .api
            .init(metadata)
            .await
            .map_err(|e| UploadError::from_api(Phase::InitiatingSession, e))?;

        if !init.upload_token.is_valid_header() {
            return Err(UploadError::InvalidSessionToken {
                upload_id: init.upload_id,
            });
        }

        if let Some(kid) = init.crypto.as_ref().and_then(|c| c.kid.as_deref()) {
            if kid != key.kid {
                warn!(session_kid = kid, fetched_kid = %key.kid, "session announces a different key id");
            }
        }

        let max_chunk_size = effective_chunk_size(init.max_chunk_size);
        info!(
            phase = %Phase::InitiatingSession,
            upload_id = %init.upload_id,
            max_chunk_size,
            "upload session opened"
        );

        Ok(UploadSession {
            id: init.upload_id,
            token: init.upload_token,
            max_chunk_size,
            offset: 0,
        })
    }

    /// Send the ciphertext in order, one segment at a time. Returns the segment count.
    async fn send_segments(
        &self,
        session: &mut UploadSession,
        ciphertext: &[u8],
    ) -> Result<usize, UploadError> {
        let ranges = segment_ranges(ciphertext.len(), session.max_chunk_size);
        let total = ranges.len();

        for (index, range) in ranges.enumerate() {
            debug_assert_eq!(range.start, session.offset);
            self.api
                .chunk(
                    &session.id,
                    &session.token,
                    range.start as u64,
                    index,
                    ciphertext[range.clone()].to_vec(),
                )
                .await
                .map_err(|e| UploadError::from_api(Phase::TransmittingSegments, e))?;

            session.offset = range.end;
            debug!(
                phase = %Phase::TransmittingSegments,
                upload_id = %session.id,
                segment = index + 1,
                total,
                offset = session.offset,
                "segment sent"
            );
        }

        Ok(total)
    }

    async fn finalize(
        &self,
        session: &UploadSession,
        envelope: &DigitalEnvelope,
        key: &ServerKey,
        segments: usize,
    ) -> Result<UploadReceipt, UploadError> {
        let wrapped = envelope.wrap_key(&key.public_key)?;
        let body = CompleteRequest {
            expected_sha256: envelope.ciphertext_sha256().to_string(),
            wrapped_key: base64url_nopad(&wrapped),
            iv: base64url_nopad(envelope.nonce()),
            tag: base64url_nopad(envelope.tag()),
            alg: WRAP_ALG.to_string(),
            enc: CONTENT_ALG.to_string(),
            kid: key.kid.clone(),
        };

        let done = self
            .api
            .complete(&session.id, &session.token, &body)
            .await
            .map_err(|e| UploadError::from_api(Phase::Finalizing, e))?;

        info!(
            phase = %Phase::Finalizing,
            upload_id = %session.id,
            status = %done.status,
            snr = done.snr,
            "upload complete"
        );

        Ok(UploadReceipt {
            upload_id: session.id.clone(),
            status: done.status,
            snr: done.snr,
            recording_id: done.recording_id,
            segments,
            ciphertext_len: session.offset,
        })
    }
}

/// Seal the payload off the async workers; the plaintext is wiped once sealed.
async fn encrypt(payload: Zeroizing<Vec<u8>>) -> Result<DigitalEnvelope, UploadError> {
    debug!(phase = %Phase::Encrypting, "sealing payload");
    let sealed = tokio::task::spawn_blocking(move || DigitalEnvelope::seal(&payload))
        .await
        .map_err(|e| UploadError::Crypto(CryptoError::EncryptionFailed(e.to_string())))?;
    Ok(sealed?)
}
