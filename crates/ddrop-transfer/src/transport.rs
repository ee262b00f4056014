//! Presigned object transfer
//!
//! A presigned PUT is only valid with exactly the headers it was signed
//! with. Implementations send the header map they are given verbatim and
//! add nothing provider-specific of their own.

use async_trait::async_trait;
use ddrop_core::api::FieldMap;
use ddrop_core::{DropResult, ObjectRef};

/// Content type for chunk uploads when the backend sends no field map
pub const CHUNK_CONTENT_TYPE: &str = "application/octet-stream";

/// Content type for the manifest upload when the backend sends no field map
pub const MANIFEST_CONTENT_TYPE: &str = "application/json";

#[async_trait]
pub trait ObjectTransport: Send + Sync {
    /// PUT `body` to `url` with exactly `headers`.
    ///
    /// Non-success maps to `UploadRejected`, an expired signature to
    /// `PresignedUrlExpired`. `target` only labels errors.
    async fn put(
        &self,
        target: ObjectRef,
        url: &str,
        headers: &FieldMap,
        body: Vec<u8>,
    ) -> DropResult<()>;

    /// Unauthenticated GET. Non-success maps to `DownloadFailed`.
    async fn get(&self, target: ObjectRef, url: &str) -> DropResult<Vec<u8>>;
}

/// Headers for a presigned PUT: the backend's map as-is, or a bare
/// `Content-Type` when it supplied none.
pub fn upload_headers(fields: Option<&FieldMap>, default_content_type: &str) -> FieldMap {
    match fields {
        Some(f) => f.clone(),
        None => FieldMap::from([("Content-Type".to_string(), default_content_type.to_string())]),
    }
}

/// Does an error response mean the presigned URL expired?
pub fn is_expired_response(status: u16, body: &str) -> bool {
    if body.contains("Request has expired") {
        return true;
    }
    status == 403 && body.contains("AccessDenied") && body.to_ascii_lowercase().contains("expired")
}

/// Presigned URLs carry credentials in the query; log only a prefix.
pub fn redact_url(url: &str) -> &str {
    match url.char_indices().nth(50) {
        Some((i, _)) => &url[..i],
        None => url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_pass_through_unchanged() {
        let fields = FieldMap::from([
            ("Content-Type".to_string(), "application/octet-stream".to_string()),
            ("x-amz-server-side-encryption".to_string(), "AES256".to_string()),
            ("x-amz-acl".to_string(), "bucket-owner-full-control".to_string()),
        ]);
        assert_eq!(upload_headers(Some(&fields), MANIFEST_CONTENT_TYPE), fields);
    }

    #[test]
    fn test_missing_fields_send_only_content_type() {
        let headers = upload_headers(None, MANIFEST_CONTENT_TYPE);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers["Content-Type"], "application/json");
    }

    #[test]
    fn test_expired_detection() {
        let s3_body = "<Error><Code>AccessDenied</Code><Message>Request has expired</Message></Error>";
        assert!(is_expired_response(403, s3_body));
        assert!(is_expired_response(403, "<Code>AccessDenied</Code> token Expired"));
        assert!(!is_expired_response(403, "<Code>SignatureDoesNotMatch</Code>"));
        assert!(!is_expired_response(500, "internal error"));
    }

    #[test]
    fn test_redact_url() {
        let url = format!("https://bucket.s3.amazonaws.com/key?X-Amz-Signature={}", "f".repeat(64));
        assert_eq!(redact_url(&url).len(), 50);
        assert_eq!(redact_url("https://short"), "https://short");
    }
}
