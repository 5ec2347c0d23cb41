use anyhow::{Context, Result};
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use std::future::Future;
use thiserror::Error;

use crate::models::{ClientSettings, ErrorInfo, ServiceHealth};

/// The original image packaged for one submission.
#[derive(Clone, Debug)]
pub struct UploadPayload {
    pub data: Bytes,
    pub file_name: String,
    pub mime_type: String,
}

/// Image payload returned by a successful processing exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessedPayload {
    pub data: Bytes,

    /// Media type of the processed image, taken from the response header
    /// or sniffed from the payload when the header is unusable.
    pub mime_type: String,
}

/// Errors that can come out of a processing exchange
#[derive(Error, Debug)]
pub enum BackendError {
    /// Transport-level failure: host unreachable, connection refused,
    /// timeout, or the body cut off mid-read.
    #[error("processing service unreachable: {0}")]
    Unreachable(String),

    /// The service answered with a non-success status.
    #[error("processing service rejected the request (HTTP {status}): {body}")]
    Service { status: u16, body: String },

    /// The transport call succeeded but the 2xx body was not an image.
    #[error("server returned non-image payload ({content_type})")]
    MalformedResponse { content_type: String },

    /// The upload itself could not be encoded (bad media type string).
    #[error("could not encode the upload: {0}")]
    InvalidUpload(String),
}

impl From<BackendError> for ErrorInfo {
    fn from(err: BackendError) -> Self {
        let message = err.to_string();
        match err {
            BackendError::Unreachable(_) => ErrorInfo::unreachable(message),
            BackendError::Service { .. } => ErrorInfo::service(message),
            BackendError::MalformedResponse { .. } => ErrorInfo::malformed(message),
            BackendError::InvalidUpload(_) => ErrorInfo::validation(message),
        }
    }
}

/// Seam between the workflow and the network.
///
/// The workflow controller is generic over this trait so the orchestration
/// logic is testable with scripted backends; [`HttpBackend`] is the real
/// implementation.
pub trait ProcessingBackend: Send + Sync + 'static {
    /// Perform one processing exchange. No retries happen here — retry is
    /// a caller decision.
    fn submit(
        &self,
        upload: UploadPayload,
    ) -> impl Future<Output = Result<ProcessedPayload, BackendError>> + Send;

    /// Lightweight liveness probe.
    fn probe(&self) -> impl Future<Output = ServiceHealth> + Send;
}

/// Shared backend handles forward to the inner implementation, so a
/// controller can own one `Arc` while another handle stays with the caller.
impl<T: ProcessingBackend + ?Sized> ProcessingBackend for std::sync::Arc<T> {
    fn submit(
        &self,
        upload: UploadPayload,
    ) -> impl Future<Output = Result<ProcessedPayload, BackendError>> + Send {
        (**self).submit(upload)
    }

    fn probe(&self) -> impl Future<Output = ServiceHealth> + Send {
        (**self).probe()
    }
}

/// HTTP client for the remote processing service.
///
/// Submissions are a single multipart field named `file` carrying the
/// original image bytes — the one canonical request shape of the service
/// contract. Earlier client generations tried alternate encodings when a
/// request failed; that guessing is intentionally gone.
pub struct HttpBackend {
    client: reqwest::Client,
    submit_url: String,
    probe_url: String,
}

impl HttpBackend {
    pub fn new(settings: &ClientSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            submit_url: settings.submit_url(),
            probe_url: settings.probe_url(),
        })
    }
}

impl ProcessingBackend for HttpBackend {
    fn submit(
        &self,
        upload: UploadPayload,
    ) -> impl Future<Output = Result<ProcessedPayload, BackendError>> + Send {
        let client = self.client.clone();
        let url = self.submit_url.clone();

        async move {
            tracing::debug!(
                "submitting {} ({} bytes, {}) to {}",
                upload.file_name,
                upload.data.len(),
                upload.mime_type,
                url
            );

            let part = Part::bytes(upload.data.to_vec())
                .file_name(upload.file_name.clone())
                .mime_str(&upload.mime_type)
                .map_err(|e| BackendError::InvalidUpload(e.to_string()))?;
            let form = Form::new().part("file", part);

            let response = client
                .post(&url)
                .multipart(form)
                .send()
                .await
                .map_err(classify_transport)?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                tracing::warn!("processing service answered HTTP {}: {}", status, body);
                return Err(BackendError::Service {
                    status: status.as_u16(),
                    body,
                });
            }

            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_string();

            let data = response.bytes().await.map_err(classify_transport)?;

            match image_mime_type(&content_type, &data) {
                Some(mime_type) => {
                    tracing::info!("received processed image ({} bytes, {})", data.len(), mime_type);
                    Ok(ProcessedPayload { data, mime_type })
                }
                None => Err(BackendError::MalformedResponse {
                    content_type: if content_type.is_empty() {
                        "no content type".to_string()
                    } else {
                        content_type
                    },
                }),
            }
        }
    }

    fn probe(&self) -> impl Future<Output = ServiceHealth> + Send {
        let client = self.client.clone();
        let url = self.probe_url.clone();

        async move {
            match client.get(&url).send().await {
                Ok(response) if response.status().is_success() => ServiceHealth::Available,
                Ok(response) => {
                    tracing::debug!("liveness probe answered HTTP {}", response.status());
                    ServiceHealth::Unavailable
                }
                Err(err) => {
                    tracing::debug!("liveness probe failed: {}", err);
                    ServiceHealth::Unavailable
                }
            }
        }
    }
}

/// Map transport failures onto the error taxonomy. Everything below the
/// HTTP layer reads as "unreachable" to the user; the message keeps the
/// specific cause for the logs.
fn classify_transport(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Unreachable(format!("request timed out ({err})"))
    } else if err.is_connect() {
        BackendError::Unreachable(format!("connection failed ({err})"))
    } else {
        BackendError::Unreachable(format!("transport error ({err})"))
    }
}

/// Media type of a 2xx body, if it is an image.
///
/// Trusts an `image/*` Content-Type header; otherwise falls back to
/// sniffing the payload's magic bytes, so a service that forgets the
/// header on a real image still works. Returns `None` for everything else.
fn image_mime_type(content_type: &str, data: &[u8]) -> Option<String> {
    let declared = content_type.split(';').next().unwrap_or("").trim();
    if declared.starts_with("image/") {
        return Some(declared.to_string());
    }

    image::guess_format(data)
        .ok()
        .map(|format| format.to_mime_type().to_string())
}
