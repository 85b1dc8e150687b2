//! The subset of an update-check response the performer actually needs.
//!
//! In the full system this is populated by parsing an Omaha response;
//! that parser is out of scope here, so an [`InstallPlan`] is built
//! directly (by the CLI's argument parsing, or by a test) and borrowed
//! for the lifetime of one update attempt.

use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct InstallPlan {
    /// Total size in bytes of the payload, header included. Used by
    /// `VerifyPayload` to catch a truncated or over-long transfer.
    pub payload_size: u64,

    /// Expected SHA-256 of the entire payload, as delivered out of band
    /// (e.g. from the update-check response), hex- or base64-decoded by
    /// the caller before constructing the plan.
    pub payload_hash: Vec<u8>,

    /// Expected size of header + manifest, if known ahead of time.
    pub metadata_size: Option<u64>,

    /// Base64-encoded `Signatures` protobuf covering the manifest bytes,
    /// as delivered out of band. Required unless `hash_checks_mandatory`
    /// is false.
    pub metadata_signature: String,

    pub is_full_update: bool,

    /// Required for a delta (minor_version 2) update: paths to the
    /// current rootfs and kernel partitions, read-only.
    pub source_path: Option<PathBuf>,
    pub kernel_source_path: Option<PathBuf>,

    /// Target partitions the performer writes into.
    pub target_path: PathBuf,
    pub kernel_target_path: PathBuf,

    /// Base64-encoded RSA public key, overriding the key file on disk,
    /// honored only on non-official builds.
    pub public_key_rsa: Option<String>,
    pub public_key_path: Option<PathBuf>,

    pub hash_checks_mandatory: bool,

    /// Expected SHA-256 hashes of the source partitions, checked once on
    /// a fresh (non-resumed) delta update.
    pub source_rootfs_hash: Vec<u8>,
    pub source_kernel_hash: Vec<u8>,
}
