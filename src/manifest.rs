//! Manifest-level validation, grounded in
//! `DeltaPerformer::{ValidateManifest, VerifySourcePartitions}`.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use update_format_crau::proto::DeltaArchiveManifest;

use crate::error::ErrorCode;
use crate::install_plan::InstallPlan;

const FULL_PAYLOAD_MINOR_VERSION: u32 = 0;
const SUPPORTED_DELTA_MINOR_VERSION: u32 = 2;

/// Mirrors `DeltaPerformer::ValidateManifest`: a full payload may not
/// carry `old_*_info` and must declare minor_version 0; a delta payload
/// must declare the one delta minor_version this implementation knows
/// how to apply.
pub fn validate_manifest(manifest: &DeltaArchiveManifest, install_plan: &InstallPlan) -> Result<(), ErrorCode> {
    let has_old_info = manifest.has_old_rootfs_info() || manifest.has_old_kernel_info();

    if install_plan.is_full_update {
        if has_old_info {
            return Err(ErrorCode::PayloadMismatchedType);
        }
        if manifest.minor_version() != FULL_PAYLOAD_MINOR_VERSION {
            return Err(ErrorCode::UnsupportedMinorPayloadVersion);
        }
    } else {
        if manifest.minor_version() != SUPPORTED_DELTA_MINOR_VERSION {
            return Err(ErrorCode::UnsupportedMinorPayloadVersion);
        }
    }

    Ok(())
}

fn sha256_of_file(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_vec())
}

/// Mirrors `DeltaPerformer::VerifySourcePartitions`: called only on a
/// fresh (non-resumed) delta update, per the design note that resume
/// does not re-verify the source partitions.
pub fn verify_source_partitions(install_plan: &InstallPlan) -> Result<(), ErrorCode> {
    if let Some(source_path) = &install_plan.source_path {
        if !install_plan.source_rootfs_hash.is_empty() {
            let got = sha256_of_file(source_path).map_err(|_| ErrorCode::DownloadStateInitializationError)?;
            if got != install_plan.source_rootfs_hash {
                log::error!("source rootfs hash mismatch");
                return Err(ErrorCode::DownloadStateInitializationError);
            }
        }
    }

    if let Some(kernel_source_path) = &install_plan.kernel_source_path {
        if !install_plan.source_kernel_hash.is_empty() {
            let got = sha256_of_file(kernel_source_path).map_err(|_| ErrorCode::DownloadStateInitializationError)?;
            if got != install_plan.source_kernel_hash {
                log::error!("source kernel hash mismatch");
                return Err(ErrorCode::DownloadStateInitializationError);
            }
        }
    }

    Ok(())
}
