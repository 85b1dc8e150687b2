//! The error taxonomy surfaced to callers of [`crate::performer::DeltaPerformer`],
//! mirroring `chromeos_update_engine::ErrorCode` value-for-value so that
//! callers can match on a specific failure rather than a formatted string.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorCode {
    #[default]
    Success,

    // Format errors.
    DownloadInvalidMetadataMagicString,
    UnsupportedMajorPayloadVersion,
    UnsupportedMinorPayloadVersion,
    PayloadMismatchedType,
    DownloadInvalidMetadataSize,
    DownloadManifestParseError,

    // Signature errors.
    DownloadMetadataSignatureMissingError,
    DownloadMetadataSignatureError,
    DownloadMetadataSignatureVerificationError,
    DownloadMetadataSignatureMismatch,
    SignedDeltaPayloadExpectedError,
    DownloadPayloadVerificationError,
    DownloadPayloadPubKeyVerificationError,
    PayloadHashMismatchError,
    PayloadSizeMismatchError,

    // Operation errors.
    DownloadOperationHashMissingError,
    DownloadOperationHashVerificationError,
    DownloadOperationHashMismatch,
    DownloadOperationExecutionError,

    // State errors.
    DownloadStateInitializationError,

    // Cooperative cancellation. Not part of the original taxonomy, but
    // `ShouldCancel` needs somewhere to put its reason.
    UpdateCanceled,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for ErrorCode {}
