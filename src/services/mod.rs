//! Services module - Pure business logic for the image-processing workflow.
//!
//! Everything here is **framework-agnostic**: no view code, no controller
//! state, only explicit inputs and outputs. The workflow controller wires
//! these pieces together.
//!
//! # Components
//!
//! - [`validate`]: upload policy enforcement. The media type check runs
//!   strictly before the size check; the first failure wins.
//!
//! - [`backend`]: the network exchange with the remote processing service.
//!   [`HttpBackend`] posts the original as a single multipart field and
//!   classifies every failure into the taxonomy the workflow stores:
//!   transport trouble (`Unreachable`), non-2xx answers (`Service`), and
//!   2xx answers whose body is not an image (`MalformedResponse`). It also
//!   carries the liveness probe. The [`ProcessingBackend`] trait is the
//!   seam the controller is generic over.
//!
//! - [`progress`]: the bounded, monotonic progress estimate for an
//!   outstanding request. The ticking task is owned by a request token and
//!   stops itself as soon as that token is superseded.

pub mod backend;
pub mod progress;
pub mod validate;

pub use backend::{
    BackendError, HttpBackend, ProcessedPayload, ProcessingBackend, UploadPayload,
};
pub use validate::{FileCandidate, UploadPolicy, ValidateError, ValidatedFile, validate};
