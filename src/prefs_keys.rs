//! Names of the preference-store keys the performer reads and writes.
//! Centralized here so `resume.rs` and `performer.rs` never typo a key.

pub const NEXT_OPERATION: &str = "UpdateStateNextOperation";
pub const NEXT_DATA_OFFSET: &str = "UpdateStateNextDataOffset";
pub const NEXT_DATA_LENGTH: &str = "UpdateStateNextDataLength";
pub const SHA256_CONTEXT: &str = "UpdateStateSHA256Context";
pub const SIGNED_SHA256_CONTEXT: &str = "UpdateStateSignedSHA256Context";
pub const SIGNATURE_BLOB: &str = "UpdateStateSignatureBlob";
pub const MANIFEST_METADATA_SIZE: &str = "ManifestMetadataSize";
pub const UPDATE_CHECK_RESPONSE_HASH: &str = "UpdateCheckResponseHash";
pub const RESUMED_UPDATE_FAILURES: &str = "ResumedUpdateFailures";

pub const MAX_RESUMED_UPDATE_FAILURES: i64 = 10;
