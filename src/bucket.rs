//! Timeout-bounded object upload with optional client-side envelope
//! encryption.

use crate::config::{Mailbox, RequestConfig};
use crate::sysexit::Sysexit;
use aes_gcm::aead::{Aead, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, KeyInit};
use aws_config::{BehaviorVersion, Region};
use aws_sdk_kms::operation::generate_data_key::GenerateDataKeyError;
use aws_sdk_kms::types::DataKeySpec;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::put_object::PutObjectError;
use aws_sdk_s3::primitives::ByteStream;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::future::Future;
use std::time::{Duration, Instant};

/// Terminal result of one upload attempt. Exactly one is produced per
/// invocation and it determines the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The object store accepted the message.
    Delivered,
    /// The upload outlived its own deadline; safe to ask the MTA to retry.
    CanceledByTimeout,
    /// The request failed for any other reason (network, auth, service-side
    /// rejection). Could be permanent, so the MTA must not blindly requeue.
    TransportOrServiceFailure,
    /// Client construction failed; a bug or misconfiguration, never retried.
    InternalError,
}

impl UploadOutcome {
    /// The single place an upload result turns into an exit code.
    pub fn sysexit(self) -> Sysexit {
        match self {
            Self::Delivered => Sysexit::Ok,
            Self::CanceledByTimeout => Sysexit::TempFail,
            Self::TransportOrServiceFailure => Sysexit::Unavailable,
            Self::InternalError => Sysexit::Software,
        }
    }
}

/// Failure constructing the storage client; never retried.
#[derive(Debug, thiserror::Error)]
enum BuildError {
    #[error("data key generation failed: {0}")]
    GenerateDataKey(#[from] SdkError<GenerateDataKeyError>),
    #[error("data key material missing from KMS response")]
    MissingKeyMaterial,
    #[error("data key has the wrong length for AES-256-GCM")]
    KeyLength,
}

/// Failure of the put-object request itself.
#[derive(Debug, thiserror::Error)]
enum PutError {
    #[error("payload encryption failed")]
    Seal,
    #[error(transparent)]
    Api(#[from] SdkError<PutObjectError>),
}

/// Storage client, selected once at construction from whether the mailbox
/// carries a CMK key ARN. Exactly two kinds exist: plain, or wrapping the
/// upload in client-side envelope encryption.
enum StoreClient {
    Plain(aws_sdk_s3::Client),
    Encrypting {
        s3: aws_sdk_s3::Client,
        cipher: Aes256Gcm,
        /// KMS-wrapped data key, base64, stored as object metadata.
        wrapped_key: String,
        /// Material description tying the envelope to the master key.
        matdesc: String,
    },
}

impl StoreClient {
    async fn build(request_config: &RequestConfig, cmk_key_arn: &str) -> Result<Self, BuildError> {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(request_config.region.clone()))
            .load()
            .await;

        let s3 = if request_config.endpoint {
            let conf = aws_sdk_s3::config::Builder::from(&shared)
                .endpoint_url(format!("https://s3.{}.amazonaws.com", request_config.region))
                .build();
            aws_sdk_s3::Client::from_conf(conf)
        } else {
            aws_sdk_s3::Client::new(&shared)
        };

        if cmk_key_arn.is_empty() {
            return Ok(Self::Plain(s3));
        }

        let data_key = aws_sdk_kms::Client::new(&shared)
            .generate_data_key()
            .key_id(cmk_key_arn)
            .key_spec(DataKeySpec::Aes256)
            .send()
            .await?;

        let plaintext = data_key
            .plaintext()
            .ok_or(BuildError::MissingKeyMaterial)?;
        let wrapped = data_key
            .ciphertext_blob()
            .ok_or(BuildError::MissingKeyMaterial)?;

        let cipher =
            Aes256Gcm::new_from_slice(plaintext.as_ref()).map_err(|_| BuildError::KeyLength)?;

        Ok(Self::Encrypting {
            s3,
            cipher,
            wrapped_key: BASE64.encode(wrapped.as_ref()),
            matdesc: serde_json::json!({ "kms_cmk_id": cmk_key_arn }).to_string(),
        })
    }

    /// Issue the single put-object request: whole body as the payload, no
    /// chunking, no multipart, no partial-write recovery.
    async fn put(&self, bucket: &str, key: &str, body: &[u8]) -> Result<(), PutError> {
        match self {
            Self::Plain(s3) => {
                s3.put_object()
                    .bucket(bucket)
                    .key(key)
                    .body(ByteStream::from(body.to_vec()))
                    .send()
                    .await?;
            }
            Self::Encrypting {
                s3,
                cipher,
                wrapped_key,
                matdesc,
            } => {
                let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
                let sealed = cipher.encrypt(&nonce, body).map_err(|_| PutError::Seal)?;

                // Envelope fields an S3 encryption client expects on the object.
                s3.put_object()
                    .bucket(bucket)
                    .key(key)
                    .body(ByteStream::from(sealed))
                    .metadata("x-amz-key-v2", wrapped_key)
                    .metadata("x-amz-iv", BASE64.encode(nonce))
                    .metadata("x-amz-cek-alg", "AES/GCM/NoPadding")
                    .metadata("x-amz-wrap-alg", "kms")
                    .metadata("x-amz-matdesc", matdesc)
                    .send()
                    .await?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for StoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("StoreClient::Plain"),
            Self::Encrypting { .. } => f.write_str("StoreClient::Encrypting"),
        }
    }
}

/// Upload `body` to the mailbox bucket under `key`, bounded by the configured
/// timeout. Returns exactly one outcome; all failure classification happens
/// here.
pub async fn put_object(
    request_config: &RequestConfig,
    mailbox: &Mailbox,
    address: &str,
    key: &str,
    body: &[u8],
) -> UploadOutcome {
    let client = match StoreClient::build(request_config, &mailbox.cmk_key_arn).await {
        Ok(client) => client,
        Err(e) => {
            log::error!("failed to construct storage client: {e}");
            return UploadOutcome::InternalError;
        }
    };

    let size = human_size(body.len() as u64);
    log::info!("sending {key} to {}", mailbox.bucket);

    let bound = (request_config.timeout > 0).then(|| Duration::from_secs(request_config.timeout));
    let started = Instant::now();
    let outcome = bounded(client.put(&mailbox.bucket, key, body), bound).await;

    match outcome {
        UploadOutcome::Delivered => {
            log::info!(
                "transfer complete for {key}, {size} sent to {} in {:?}",
                mailbox.bucket,
                started.elapsed()
            );
        }
        UploadOutcome::CanceledByTimeout => {
            log::warn!(
                "upload canceled due to timeout ({}s)",
                request_config.timeout
            );
        }
        UploadOutcome::TransportOrServiceFailure => {
            log::error!("message delivery failed for: {address}");
        }
        UploadOutcome::InternalError => {}
    }
    outcome
}

/// Run the put future under an optional deadline.
///
/// A request that outlives its own deadline classifies as canceled-by-timeout
/// even though the abandoned request also looks like a generic failure; the
/// two map to different MTA retry semantics. Dropping the future on timeout
/// releases both the request and the timer on every path.
async fn bounded<F>(put: F, bound: Option<Duration>) -> UploadOutcome
where
    F: Future<Output = Result<(), PutError>>,
{
    let result = match bound {
        Some(limit) => match tokio::time::timeout(limit, put).await {
            Ok(result) => result,
            Err(_) => return UploadOutcome::CanceledByTimeout,
        },
        None => put.await,
    };

    match result {
        Ok(()) => UploadOutcome::Delivered,
        Err(e) => {
            log::error!("put object failed: {e}");
            UploadOutcome::TransportOrServiceFailure
        }
    }
}

/// Format a byte count with base-1000 units, one decimal above bytes.
fn human_size(size: u64) -> String {
    const UNIT: u64 = 1000;
    if size < UNIT {
        return format!("{size} B");
    }

    let mut div = UNIT;
    let mut exp = 0;
    let mut n = size / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }

    const PREFIXES: [char; 6] = ['k', 'M', 'G', 'T', 'P', 'E'];
    let prefix = PREFIXES.get(exp).copied().unwrap_or('E');
    format!("{:.1} {prefix}B", size as f64 / div as f64)
}
