use bytes::Bytes;
use thiserror::Error;

/// Policy the validator enforces before a file enters the workflow.
#[derive(Clone, Copy, Debug)]
pub struct UploadPolicy {
    /// Upper bound on the candidate payload size, in bytes.
    pub max_bytes: u64,
}

impl UploadPolicy {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }
}

/// A file the user picked, before validation.
#[derive(Clone, Debug)]
pub struct FileCandidate {
    pub display_name: String,

    /// Declared media type, e.g. `image/png`.
    pub mime_type: String,

    pub data: Bytes,
}

impl FileCandidate {
    pub fn new(
        display_name: impl Into<String>,
        mime_type: impl Into<String>,
        data: Bytes,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }

    pub fn byte_size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Why a candidate was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidateError {
    #[error("{display_name} is not an image (reported type: {mime_type})")]
    NotAnImage {
        display_name: String,
        mime_type: String,
    },

    #[error("{display_name} is too large: {actual} bytes exceeds the {limit} byte limit")]
    TooLarge {
        display_name: String,
        actual: u64,
        limit: u64,
    },
}

/// A candidate that passed validation. The wrapper is the only way to get
/// a file into the workflow, so an unchecked candidate cannot slip in.
#[derive(Clone, Debug)]
pub struct ValidatedFile(FileCandidate);

impl ValidatedFile {
    pub fn candidate(&self) -> &FileCandidate {
        &self.0
    }

    pub fn into_inner(self) -> FileCandidate {
        self.0
    }
}

/// Check a candidate against the upload policy.
///
/// Rules run in order and the first failure wins: the media type check
/// strictly precedes the size check, so an oversized non-image is
/// rejected as "not an image". Pure function; no side effects.
pub fn validate(
    candidate: FileCandidate,
    policy: &UploadPolicy,
) -> Result<ValidatedFile, ValidateError> {
    if !candidate.mime_type.starts_with("image/") {
        return Err(ValidateError::NotAnImage {
            display_name: candidate.display_name,
            mime_type: candidate.mime_type,
        });
    }

    let actual = candidate.byte_size();
    if actual > policy.max_bytes {
        return Err(ValidateError::TooLarge {
            display_name: candidate.display_name,
            actual,
            limit: policy.max_bytes,
        });
    }

    Ok(ValidatedFile(candidate))
}
