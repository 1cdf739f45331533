use aws_sdk_s3::Client;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_smithy_types::byte_stream::ByteStream;

use crate::error::StorageError;

const JSON: &str = "application/json";

/// Result of a GET operation, including the body and ETag.
pub struct GetObjectOutput {
    pub body: Vec<u8>,
    pub etag: Option<String>,
}

/// Map an SDK failure onto the store's error vocabulary.
///
/// Transport failures, timeouts, 5xx responses and a missing bucket all mean
/// the backend is unavailable. 412/409 on a conditional write mean another
/// writer won.
fn classify<E>(
    err: SdkError<E, HttpResponse>,
    key: &str,
    other: fn(String) -> StorageError,
) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    if matches!(
        err,
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_)
    ) {
        return StorageError::Unavailable(DisplayErrorContext(&err).to_string());
    }

    let status = err.raw_response().map(|r| r.status().as_u16());
    let code = err.code().unwrap_or_default().to_string();

    match (status, code.as_str()) {
        (_, "NoSuchKey") | (Some(404), "") => StorageError::NotFound {
            key: key.to_string(),
        },
        (_, "NoSuchBucket") => StorageError::Unavailable(format!("bucket missing: {code}")),
        (Some(412), _) | (_, "PreconditionFailed") | (_, "ConditionalRequestConflict") => {
            StorageError::PreconditionFailed {
                key: key.to_string(),
            }
        }
        (Some(s), _) if s >= 500 => StorageError::Unavailable(format!("HTTP {s}: {code}")),
        _ => other(DisplayErrorContext(&err).to_string()),
    }
}

/// Get an object from S3.
pub async fn get_object(
    client: &Client,
    bucket: &str,
    key: &str,
) -> Result<GetObjectOutput, StorageError> {
    let resp = client
        .get_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .map_err(|e| classify(e, key, StorageError::GetObject))?;

    let etag = resp.e_tag().map(|s| s.to_string());
    let body = resp
        .body
        .collect()
        .await
        .map_err(|e| StorageError::Unavailable(e.to_string()))?
        .into_bytes()
        .to_vec();

    Ok(GetObjectOutput { body, etag })
}

/// Put a JSON object unconditionally. Returns the new ETag.
pub async fn put_json(
    client: &Client,
    bucket: &str,
    key: &str,
    body: Vec<u8>,
) -> Result<String, StorageError> {
    let resp = client
        .put_object()
        .bucket(bucket)
        .key(key)
        .content_type(JSON)
        .body(ByteStream::from(body))
        .send()
        .await
        .map_err(|e| classify(e, key, StorageError::PutObject))?;

    Ok(resp.e_tag().unwrap_or_default().to_string())
}

/// Put a JSON object only if no object exists at `key` (`If-None-Match: *`).
/// Returns `StorageError::PreconditionFailed` when one does.
pub async fn put_json_if_absent(
    client: &Client,
    bucket: &str,
    key: &str,
    body: Vec<u8>,
) -> Result<String, StorageError> {
    let resp = client
        .put_object()
        .bucket(bucket)
        .key(key)
        .content_type(JSON)
        .if_none_match("*")
        .body(ByteStream::from(body))
        .send()
        .await
        .map_err(|e| classify(e, key, StorageError::PutObject))?;

    Ok(resp.e_tag().unwrap_or_default().to_string())
}

/// Put a JSON object with an If-Match precondition (ETag optimistic locking).
pub async fn put_json_if_match(
    client: &Client,
    bucket: &str,
    key: &str,
    body: Vec<u8>,
    expected_etag: &str,
) -> Result<String, StorageError> {
    let resp = client
        .put_object()
        .bucket(bucket)
        .key(key)
        .content_type(JSON)
        .if_match(expected_etag)
        .body(ByteStream::from(body))
        .send()
        .await
        .map_err(|e| classify(e, key, StorageError::PutObject))?;

    Ok(resp.e_tag().unwrap_or_default().to_string())
}
