use thiserror::Error;

/// Errors raised while locating, extracting or embedding the manifest segment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContainerError {
    #[error("Unsupported asset format")]
    UnsupportedFormat,

    #[error("Corrupt manifest segment: {0}")]
    CorruptSegment(String),

    #[error("No manifest segment found in asset")]
    NoManifest,

    #[error("Manifest store of {size} bytes does not fit in the container (max {max})")]
    NoSpace { size: usize, max: usize },

    #[error("Failed to write asset: {0}")]
    WriteFailure(String),
}

/// Errors raised by the canonical manifest encoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Truncated input")]
    Truncated,

    #[error("Unknown required field: {0}")]
    UnknownRequiredField(String),

    #[error("Duplicate assertion label: {0}")]
    DuplicateAssertion(String),

    #[error("Unsupported schema version {found} (supported: {supported})")]
    SchemaVersionUnsupported { found: u64, supported: u64 },

    #[error("Non-canonical encoding: {0}")]
    NonCanonical(String),

    #[error("Malformed encoding: {0}")]
    Malformed(String),

    #[error("In manifest {manifest}: {source}")]
    InManifest {
        manifest: String,
        #[source]
        source: Box<CodecError>,
    },
}

impl CodecError {
    /// The innermost error, with manifest context stripped.
    pub fn root(&self) -> &CodecError {
        match self {
            Self::InManifest { source, .. } => source.root(),
            other => other,
        }
    }

    pub(crate) fn in_manifest(self, manifest: impl Into<String>) -> Self {
        Self::InManifest {
            manifest: manifest.into(),
            source: Box::new(self),
        }
    }
}

/// Failures of the cryptographic plumbing (not verification outcomes).
#[derive(Error, Debug)]
pub enum TrustError {
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),

    #[error("Invalid certificate: {0}")]
    InvalidCertificate(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while building a manifest store from an asset.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Asset carries no manifest store")]
    NoManifest,

    #[error("Active manifest {0} is not present in the store")]
    DanglingActivePointer(String),

    #[error("Manifest {0} appears more than once in the store")]
    DuplicateManifest(String),

    #[error("Ingredient graph contains a cycle through manifest {0}")]
    CyclicProvenance(String),

    #[error("Container error: {0}")]
    Container(ContainerError),

    #[error("Failed to decode manifest store: {0}")]
    Codec(#[from] CodecError),
}

impl From<ContainerError> for StoreError {
    fn from(err: ContainerError) -> Self {
        match err {
            ContainerError::NoManifest => Self::NoManifest,
            other => Self::Container(other),
        }
    }
}

/// Errors raised by the signing pipeline.
#[derive(Error, Debug)]
pub enum SignError {
    #[error("Signing key rejected: {0}")]
    SigningKeyRejected(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Ingredient manifest {0} conflicts with a different manifest already in the store")]
    ConflictingManifest(String),

    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Top-level error for the file and JSON boundary.
#[derive(Error, Debug)]
pub enum CredenceError {
    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sign(#[from] SignError),

    #[error(transparent)]
    Trust(#[from] TrustError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid manifest definition: {0}")]
    InvalidDefinition(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CredenceError>;

impl CredenceError {
    /// Stable machine-readable code for the boundary error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Container(e) | Self::Sign(SignError::Container(e)) => container_code(e),
            Self::Store(e) | Self::Sign(SignError::Store(e)) => match e {
                StoreError::NoManifest => "NO_MANIFEST",
                StoreError::DanglingActivePointer(_) => "DANGLING_ACTIVE_POINTER",
                StoreError::DuplicateManifest(_) => "DUPLICATE_MANIFEST",
                StoreError::CyclicProvenance(_) => "CYCLIC_PROVENANCE",
                StoreError::Container(e) => container_code(e),
                StoreError::Codec(_) => "MALFORMED_MANIFEST",
            },
            Self::Codec(_) | Self::Sign(SignError::Codec(_)) => "MALFORMED_MANIFEST",
            Self::Sign(SignError::SigningKeyRejected(_)) => "SIGNING_KEY_REJECTED",
            Self::Sign(SignError::ConflictingManifest(_)) => "CONFLICTING_MANIFEST",
            Self::Sign(SignError::MissingEnvVar(_)) => "CONFIG_ERROR",
            Self::Sign(SignError::OpenSsl(_)) | Self::Trust(_) => "CRYPTO_ERROR",
            Self::Io(e) | Self::Sign(SignError::Io(e)) => match e.kind() {
                std::io::ErrorKind::NotFound => "NOT_FOUND",
                std::io::ErrorKind::PermissionDenied => "PERMISSION_DENIED",
                _ => "IO_ERROR",
            },
            Self::Json(_) | Self::InvalidDefinition(_) => "INVALID_INPUT",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }
}

fn container_code(err: &ContainerError) -> &'static str {
    match err {
        ContainerError::UnsupportedFormat => "UNSUPPORTED_FORMAT",
        ContainerError::CorruptSegment(_) => "CORRUPT_SEGMENT",
        ContainerError::NoManifest => "NO_MANIFEST",
        ContainerError::NoSpace { .. } => "NO_SPACE",
        ContainerError::WriteFailure(_) => "WRITE_FAILURE",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_error_root() {
        let err = CodecError::Truncated.in_manifest("urn:uuid:a");
        assert_eq!(err.root(), &CodecError::Truncated);
        assert!(err.to_string().contains("urn:uuid:a"));
    }

    #[test]
    fn test_container_no_manifest_maps_to_store_no_manifest() {
        let err: StoreError = ContainerError::NoManifest.into();
        assert!(matches!(err, StoreError::NoManifest));
    }

    #[test]
    fn test_error_codes() {
        let err = CredenceError::from(SignError::from(ContainerError::NoSpace { size: 2, max: 1 }));
        assert_eq!(err.code(), "NO_SPACE");

        let err = CredenceError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(err.code(), "NOT_FOUND");

        let err = CredenceError::from(StoreError::CyclicProvenance("urn:uuid:a".into()));
        assert_eq!(err.code(), "CYCLIC_PROVENANCE");
    }
}
