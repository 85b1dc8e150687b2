//! Resume/checkpoint mechanics, grounded in
//! `DeltaPerformer::{CanResumeUpdate, ResetUpdateProgress, PrimeUpdateState,
//! CheckpointUpdateProgress}`.

use crate::prefs::Prefs;
use crate::prefs_keys as keys;

/// Everything restored from the preferences store when an update resumes
/// mid-way through applying operations.
#[derive(Debug, Clone, Default)]
pub struct ResumeState {
    pub next_operation: u64,
    pub next_data_offset: u64,
    pub sha256_context: String,
    pub signed_sha256_context: Option<String>,
    pub signature_blob: Option<Vec<u8>>,
    pub manifest_metadata_size: u64,
}

/// Everything persisted after completing one operation.
pub struct Checkpoint<'a> {
    pub next_operation: u64,
    pub next_data_offset: u64,
    pub next_data_length: u64,
    pub sha256_context: &'a str,
}

#[derive(Debug)]
pub enum PrimeOutcome {
    FreshStart,
    Resumed(ResumeState),
    Rejected(&'static str),
}

/// Mirrors `DeltaPerformer::CanResumeUpdate`: every one of these
/// conditions must hold for a resume to be admissible.
pub fn can_resume_update(prefs: &dyn Prefs, payload_id: &str) -> bool {
    let next_operation = prefs.get_int64(keys::NEXT_OPERATION).unwrap_or(-1);
    if next_operation <= 0 {
        return false;
    }

    match prefs.get_string(keys::UPDATE_CHECK_RESPONSE_HASH) {
        Some(stored) if stored == payload_id => {}
        _ => return false,
    }

    let failures = prefs.get_int64(keys::RESUMED_UPDATE_FAILURES).unwrap_or(0);
    if failures > keys::MAX_RESUMED_UPDATE_FAILURES {
        return false;
    }

    if prefs.get_int64(keys::NEXT_DATA_OFFSET).unwrap_or(-1) < 0 {
        return false;
    }

    if prefs.get_string(keys::SHA256_CONTEXT).unwrap_or_default().is_empty() {
        return false;
    }

    if prefs.get_int64(keys::MANIFEST_METADATA_SIZE).unwrap_or(0) <= 0 {
        return false;
    }

    true
}

/// Mirrors `DeltaPerformer::ResetUpdateProgress`. `quick` only
/// invalidates `NextOperation`, so that a crash mid-checkpoint leaves the
/// resume state unambiguously unusable without throwing away the rest of
/// what was recorded; a full reset wipes every scalar including the
/// payload identity and the failure counter.
pub fn reset_update_progress(prefs: &mut dyn Prefs, quick: bool) {
    prefs.set_int64(keys::NEXT_OPERATION, -1);
    if quick {
        return;
    }
    prefs.set_int64(keys::NEXT_DATA_OFFSET, -1);
    prefs.delete(keys::NEXT_DATA_LENGTH);
    prefs.delete(keys::SHA256_CONTEXT);
    prefs.delete(keys::SIGNED_SHA256_CONTEXT);
    prefs.delete(keys::SIGNATURE_BLOB);
    prefs.delete(keys::MANIFEST_METADATA_SIZE);
    prefs.delete(keys::UPDATE_CHECK_RESPONSE_HASH);
    prefs.delete(keys::RESUMED_UPDATE_FAILURES);
}

/// Mirrors `DeltaPerformer::CheckpointUpdateProgress`: first invalidate
/// `NextOperation` via a quick reset, then persist the hash context and
/// data offset, then persist `NextOperation` last, so a process killed
/// mid-checkpoint is left with either the old, fully-consistent state or
/// no resumable state at all -- never a half-updated one.
pub fn checkpoint_update_progress(prefs: &mut dyn Prefs, last_offset: u64, checkpoint: &Checkpoint) {
    if last_offset != checkpoint.next_data_offset {
        reset_update_progress(prefs, true);
        prefs.set_string(keys::SHA256_CONTEXT, checkpoint.sha256_context);
        prefs.set_int64(keys::NEXT_DATA_OFFSET, checkpoint.next_data_offset as i64);
        prefs.set_int64(keys::NEXT_DATA_LENGTH, checkpoint.next_data_length as i64);
    }
    prefs.set_int64(keys::NEXT_OPERATION, checkpoint.next_operation as i64);
}

/// Mirrors `DeltaPerformer::PrimeUpdateState`. On a fresh start, the
/// caller is responsible for calling `VerifySourcePartitions` itself
/// (see the Open Question in the design notes about resume skipping
/// this check). On resume, every scalar is restored and the failure
/// counter is speculatively bumped so a crash before the first
/// successful checkpoint still counts against the retry budget.
pub fn prime_update_state(prefs: &mut dyn Prefs, payload_id: &str) -> PrimeOutcome {
    let next_operation = prefs.get_int64(keys::NEXT_OPERATION).unwrap_or(-1);
    if next_operation <= 0 {
        prefs.set_string(keys::UPDATE_CHECK_RESPONSE_HASH, payload_id);
        prefs.set_int64(keys::RESUMED_UPDATE_FAILURES, 0);
        return PrimeOutcome::FreshStart;
    }

    if !can_resume_update(prefs, payload_id) {
        return PrimeOutcome::Rejected("stored resume state failed admissibility checks");
    }

    let state = ResumeState {
        next_operation: next_operation as u64,
        next_data_offset: prefs.get_int64(keys::NEXT_DATA_OFFSET).unwrap_or(0) as u64,
        sha256_context: prefs.get_string(keys::SHA256_CONTEXT).unwrap_or_default(),
        signed_sha256_context: prefs.get_string(keys::SIGNED_SHA256_CONTEXT),
        signature_blob: prefs
            .get_string(keys::SIGNATURE_BLOB)
            .and_then(|hex_str| hex::decode(hex_str).ok()),
        manifest_metadata_size: prefs.get_int64(keys::MANIFEST_METADATA_SIZE).unwrap_or(0) as u64,
    };

    let failures = prefs.get_int64(keys::RESUMED_UPDATE_FAILURES).unwrap_or(0);
    prefs.set_int64(keys::RESUMED_UPDATE_FAILURES, failures + 1);

    PrimeOutcome::Resumed(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::FakePrefs;

    #[test]
    fn fresh_start_when_no_prior_state() {
        let mut prefs = FakePrefs::new();
        match prime_update_state(&mut prefs, "payload-1") {
            PrimeOutcome::FreshStart => {}
            other => panic!("expected fresh start, got {other:?}"),
        }
    }

    #[test]
    fn resume_restores_recorded_offset() {
        let mut prefs = FakePrefs::new();
        prefs.set_string(keys::UPDATE_CHECK_RESPONSE_HASH, "payload-1");
        prefs.set_int64(keys::NEXT_OPERATION, 4);
        prefs.set_int64(keys::NEXT_DATA_OFFSET, 2048);
        prefs.set_string(keys::SHA256_CONTEXT, "abcd");
        prefs.set_int64(keys::MANIFEST_METADATA_SIZE, 64);

        match prime_update_state(&mut prefs, "payload-1") {
            PrimeOutcome::Resumed(state) => {
                assert_eq!(state.next_operation, 4);
                assert_eq!(state.next_data_offset, 2048);
            }
            other => panic!("expected resume, got {other:?}"),
        }
        assert_eq!(prefs.get_int64(keys::RESUMED_UPDATE_FAILURES), Some(1));
    }

    #[test]
    fn resume_rejected_for_different_payload() {
        let mut prefs = FakePrefs::new();
        prefs.set_string(keys::UPDATE_CHECK_RESPONSE_HASH, "payload-1");
        prefs.set_int64(keys::NEXT_OPERATION, 4);
        prefs.set_int64(keys::NEXT_DATA_OFFSET, 2048);
        prefs.set_string(keys::SHA256_CONTEXT, "abcd");
        prefs.set_int64(keys::MANIFEST_METADATA_SIZE, 64);

        match prime_update_state(&mut prefs, "payload-2") {
            PrimeOutcome::Rejected(_) => {}
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn checkpoint_invalidates_before_committing() {
        let mut prefs = FakePrefs::new();
        checkpoint_update_progress(
            &mut prefs,
            0,
            &Checkpoint { next_operation: 1, next_data_offset: 512, next_data_length: 64, sha256_context: "beef" },
        );
        assert_eq!(prefs.get_int64(keys::NEXT_OPERATION), Some(1));
        assert_eq!(prefs.get_string(keys::SHA256_CONTEXT), Some("beef".to_string()));
    }
}
