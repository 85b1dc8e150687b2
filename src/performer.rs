//! The streaming driver: owns the input accumulation buffer and the two
//! running hashes, parses the header and manifest incrementally as bytes
//! arrive, and dispatches install operations in order. Grounded in
//! `DeltaPerformer` as a whole (`delta_performer.h`/`delta_performer.cc`).

use std::fs::{File, OpenOptions};
use std::io::Write as IoWrite;
use std::time::Instant;

use ct_codecs::{Base64, Decoder};
use protobuf::Message;
use update_format_crau::hash_stream::HashStream;
use update_format_crau::proto::DeltaArchiveManifest;
use update_format_crau::verify_sig::{get_public_key_pkcs_pem, verify_rsa_pkcs_prehash, KeyType};

use crate::error::ErrorCode;
use crate::install_plan::InstallPlan;
use crate::manifest::{validate_manifest, verify_source_partitions};
use crate::operation::{self, OperationContext};
use crate::prefs::Prefs;
use crate::prefs_keys as keys;
use crate::progress::{LoggingSink, ProgressSink, ProgressTracker};
use crate::resume::{self, Checkpoint, PrimeOutcome};

const MAGIC: &[u8; 4] = b"CrAU";
const VERSION_OFFSET: usize = 4;
const VERSION_SIZE: usize = 8;
const MANIFEST_SIZE_OFFSET: usize = VERSION_OFFSET + VERSION_SIZE;
const MANIFEST_SIZE_SIZE: usize = 8;
const METADATA_SIGNATURE_SIZE_SIZE: usize = 4;
const HEADER_V1_SIZE: usize = MANIFEST_SIZE_OFFSET + MANIFEST_SIZE_SIZE;
const HEADER_V2_SIZE: usize = HEADER_V1_SIZE + METADATA_SIGNATURE_SIZE_SIZE;

const SUPPORTED_MAJOR_VERSIONS: [u64; 2] = [1, 2];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitingHeader,
    AwaitingManifest,
    ApplyingOperations,
    Done,
    Failed,
}

struct HeaderInfo {
    major_version: u64,
    manifest_size: u64,
    metadata_signature_size: u64,
    header_size: u64,
}

pub struct DeltaPerformer<'a> {
    prefs: &'a mut dyn Prefs,
    install_plan: &'a InstallPlan,
    payload_id: String,

    target_file: File,
    kernel_target_file: File,
    source_file: Option<File>,
    kernel_source_file: Option<File>,

    buffer: Vec<u8>,
    buffer_offset: u64,

    header: Option<HeaderInfo>,
    manifest: Option<DeltaArchiveManifest>,
    metadata_size: u64,
    data_region_offset: u64,

    next_operation_num: u64,
    num_rootfs_operations: u64,
    num_total_operations: u64,
    skip_to: Option<u64>,
    fast_forward_to: Option<u64>,

    hash: HashStream,
    signed_hash: HashStream,
    signed_hash_snapshot: Option<String>,
    signature_blob: Option<Vec<u8>>,

    total_bytes_received: u64,
    progress: ProgressTracker,
    sink: Box<dyn ProgressSink>,

    state: State,
    last_checkpointed_offset: u64,
}

impl<'a> DeltaPerformer<'a> {
    /// Opens the target rootfs and kernel partitions for writing, and,
    /// for a delta update, the corresponding source partitions
    /// read-only. Mirrors `Open`/`OpenKernel`/`OpenSourceRootfs`/
    /// `OpenSourceKernel`.
    pub fn open(prefs: &'a mut dyn Prefs, install_plan: &'a InstallPlan, payload_id: impl Into<String>) -> std::io::Result<Self> {
        let target_file = OpenOptions::new().write(true).open(&install_plan.target_path)?;
        let kernel_target_file = OpenOptions::new().write(true).open(&install_plan.kernel_target_path)?;

        let source_file = match &install_plan.source_path {
            Some(path) => Some(File::open(path)?),
            None => None,
        };
        let kernel_source_file = match &install_plan.kernel_source_path {
            Some(path) => Some(File::open(path)?),
            None => None,
        };

        Ok(DeltaPerformer {
            prefs,
            install_plan,
            payload_id: payload_id.into(),
            target_file,
            kernel_target_file,
            source_file,
            kernel_source_file,
            buffer: Vec::new(),
            buffer_offset: 0,
            header: None,
            manifest: None,
            metadata_size: 0,
            data_region_offset: 0,
            next_operation_num: 0,
            num_rootfs_operations: 0,
            num_total_operations: 0,
            skip_to: None,
            fast_forward_to: None,
            hash: HashStream::new(),
            signed_hash: HashStream::new(),
            signed_hash_snapshot: None,
            signature_blob: None,
            total_bytes_received: 0,
            progress: ProgressTracker::new(Some(install_plan.payload_size), 0, Instant::now()),
            sink: Box::new(LoggingSink),
            state: State::AwaitingHeader,
            last_checkpointed_offset: 0,
        })
    }

    pub fn set_progress_sink(&mut self, sink: Box<dyn ProgressSink>) {
        self.sink = sink;
    }

    pub fn is_manifest_valid(&self) -> bool {
        self.manifest.is_some()
    }

    pub fn manifest(&self) -> Option<&DeltaArchiveManifest> {
        self.manifest.as_ref()
    }

    /// Byte size of header+manifest, available once the manifest has
    /// parsed; 0 before then.
    pub fn get_metadata_size(&self) -> u64 {
        self.metadata_size
    }

    /// The manifest's `minor_version` (0 for a full payload, 2 for a
    /// delta payload), once the manifest has parsed.
    pub fn get_minor_version(&self) -> Option<u32> {
        self.manifest.as_ref().map(|m| m.minor_version())
    }

    /// Appends `bytes` to the internal buffer and drives as many state
    /// transitions as the buffered content allows. Returns `Ok(true)` if
    /// everything processed so far is consistent (more bytes welcome, or
    /// the update is Done); returns `Err(code)` on an unrecoverable
    /// failure, after which the caller should discard this performer.
    pub fn write(&mut self, bytes: &[u8]) -> Result<bool, ErrorCode> {
        self.buffer.extend_from_slice(bytes);
        self.total_bytes_received += bytes.len() as u64;
        self.progress.record_bytes_received(self.total_bytes_received);

        loop {
            match self.state {
                State::AwaitingHeader => {
                    if !self.try_parse_header()? {
                        return Ok(true);
                    }
                }
                State::AwaitingManifest => {
                    if !self.try_parse_manifest()? {
                        return Ok(true);
                    }
                }
                State::ApplyingOperations => {
                    if let Some(target) = self.skip_to {
                        if !self.try_skip_to(target)? {
                            return Ok(true);
                        }
                        continue;
                    }
                    if let Some(target) = self.fast_forward_to {
                        if !self.try_fast_forward(target)? {
                            return Ok(true);
                        }
                        continue;
                    }
                    if self.next_operation_num >= self.num_total_operations {
                        let manifest = self.manifest.as_ref().expect("manifest parsed before applying operations");
                        if self.signature_blob.is_none() && manifest.has_signatures_offset() && manifest.has_signatures_size() {
                            if !self.try_extract_trailing_signature()? {
                                return Ok(true);
                            }
                            continue;
                        }
                        self.state = State::Done;
                        continue;
                    }
                    if !self.try_apply_next_operation()? {
                        return Ok(true);
                    }
                }
                State::Done | State::Failed => return Ok(true),
            }
        }
    }

    fn fail(&mut self, code: ErrorCode) -> ErrorCode {
        self.state = State::Failed;
        code
    }

    fn try_parse_header(&mut self) -> Result<bool, ErrorCode> {
        if self.buffer.len() < MAGIC.len() {
            return Ok(false);
        }
        if &self.buffer[..MAGIC.len()] != MAGIC {
            return Err(self.fail(ErrorCode::DownloadInvalidMetadataMagicString));
        }
        if self.buffer.len() < MANIFEST_SIZE_OFFSET {
            return Ok(false);
        }

        let major_version = u64::from_be_bytes(self.buffer[VERSION_OFFSET..VERSION_OFFSET + VERSION_SIZE].try_into().unwrap());
        if !SUPPORTED_MAJOR_VERSIONS.contains(&major_version) {
            return Err(self.fail(ErrorCode::UnsupportedMajorPayloadVersion));
        }

        let header_size = if major_version == 2 { HEADER_V2_SIZE } else { HEADER_V1_SIZE };
        if self.buffer.len() < header_size {
            return Ok(false);
        }

        let manifest_size =
            u64::from_be_bytes(self.buffer[MANIFEST_SIZE_OFFSET..MANIFEST_SIZE_OFFSET + MANIFEST_SIZE_SIZE].try_into().unwrap());

        let metadata_signature_size = if major_version == 2 {
            u32::from_be_bytes(self.buffer[HEADER_V1_SIZE..HEADER_V1_SIZE + METADATA_SIGNATURE_SIZE_SIZE].try_into().unwrap()) as u64
        } else {
            0
        };

        self.metadata_size = header_size as u64 + manifest_size;
        if let Some(expected) = self.install_plan.metadata_size {
            if expected != self.metadata_size {
                return Err(self.fail(ErrorCode::DownloadInvalidMetadataSize));
            }
        }

        self.data_region_offset = self.metadata_size + metadata_signature_size;
        self.header = Some(HeaderInfo { major_version, manifest_size, metadata_signature_size, header_size: header_size as u64 });
        self.state = State::AwaitingManifest;
        Ok(true)
    }

    fn try_parse_manifest(&mut self) -> Result<bool, ErrorCode> {
        let header = self.header.as_ref().expect("header parsed before manifest state");
        let header_size = header.header_size as usize;
        let manifest_size = header.manifest_size as usize;
        let metadata_signature_size = header.metadata_signature_size as usize;

        let needed = self.data_region_offset as usize;
        if self.buffer.len() < needed {
            return Ok(false);
        }

        let manifest_start = header_size;
        let manifest_end = manifest_start + manifest_size;
        let manifest_bytes = self.buffer[manifest_start..manifest_end].to_vec();
        let metadata_bytes = self.buffer[..manifest_end].to_vec();
        let sig_bytes = if metadata_signature_size > 0 {
            self.buffer[manifest_end..manifest_end + metadata_signature_size].to_vec()
        } else {
            Vec::new()
        };

        if metadata_signature_size > 0 || !self.install_plan.metadata_signature.is_empty() {
            self.validate_metadata_signature(&metadata_bytes, &sig_bytes)?;
        } else if self.install_plan.hash_checks_mandatory {
            return Err(self.fail(ErrorCode::DownloadMetadataSignatureMissingError));
        }

        let manifest = DeltaArchiveManifest::parse_from_bytes(&manifest_bytes).map_err(|err| {
            log::error!("failed to parse manifest: {err}");
            self.fail(ErrorCode::DownloadManifestParseError)
        })?;

        validate_manifest(&manifest, self.install_plan).map_err(|code| self.fail(code))?;

        let num_rootfs_operations =
            if manifest.install_operations.is_empty() { manifest.partition_operations.len() } else { manifest.install_operations.len() }
                as u64;
        let num_total_operations = num_rootfs_operations + manifest.kernel_install_operations.len() as u64;

        let data_region_offset = self.data_region_offset;
        self.discard_buffer(data_region_offset);

        self.prefs.set_int64(keys::MANIFEST_METADATA_SIZE, self.metadata_size as i64);
        self.num_rootfs_operations = num_rootfs_operations;
        self.num_total_operations = num_total_operations;
        self.progress = ProgressTracker::new(Some(self.install_plan.payload_size), num_total_operations, Instant::now());
        self.manifest = Some(manifest);
        self.state = State::ApplyingOperations;

        match resume::prime_update_state(self.prefs, &self.payload_id) {
            PrimeOutcome::FreshStart => {
                if !self.install_plan.is_full_update {
                    verify_source_partitions(self.install_plan).map_err(|code| self.fail(code))?;
                }
            }
            PrimeOutcome::Resumed(resumed) => {
                self.hash = HashStream::from_context(&resumed.sha256_context).map_err(|_| self.fail(ErrorCode::DownloadStateInitializationError))?;
                if let Some(signed_ctx) = &resumed.signed_sha256_context {
                    self.signed_hash =
                        HashStream::from_context(signed_ctx).map_err(|_| self.fail(ErrorCode::DownloadStateInitializationError))?;
                }
                self.signature_blob = resumed.signature_blob;
                self.next_operation_num = resumed.next_operation;
                self.total_bytes_received += resumed.next_data_offset;
                self.last_checkpointed_offset = resumed.next_data_offset;
                // `resumed.next_data_offset` is exactly the payload offset
                // the restored hash contexts already cover (it was
                // checkpointed alongside them); bytes between here and
                // there must be skipped without re-entering either hash
                // stream, or they would be double-counted.
                self.skip_to = Some(resumed.next_data_offset.max(self.data_region_offset));
                self.fast_forward_to = self.target_offset_for_operation(resumed.next_operation);
            }
            PrimeOutcome::Rejected(reason) => {
                log::warn!("stored resume state rejected ({reason}), restarting from scratch");
                if !self.install_plan.is_full_update {
                    verify_source_partitions(self.install_plan).map_err(|code| self.fail(code))?;
                }
            }
        }

        Ok(true)
    }

    /// Absolute payload offset where `op_num`'s data begins, used to skip
    /// over already-applied operations on resume without re-executing
    /// them. `op_num == num_total_operations` (resuming right at, or
    /// past, the last operation) resolves to the start of the trailing
    /// signature blob if the manifest carries one, or to the end of the
    /// data region otherwise.
    fn target_offset_for_operation(&self, op_num: u64) -> Option<u64> {
        let manifest = self.manifest.as_ref()?;
        if op_num >= self.num_total_operations {
            if manifest.has_signatures_offset() {
                // If the signature blob was already captured by an earlier
                // attempt (persisted via the prefs store), skip past it
                // entirely rather than re-stopping at its start, so its
                // bytes still get folded into the whole-payload hash.
                let past_signature = self.data_region_offset + manifest.signatures_offset() + manifest.signatures_size();
                return Some(if self.signature_blob.is_some() { past_signature } else { self.data_region_offset + manifest.signatures_offset() });
            }
            let ops = self.operations_for(manifest);
            let last = ops.last()?;
            return Some(self.data_region_offset + last.data_offset() + last.data_length());
        }
        let ops = self.operations_for(manifest);
        let op = ops.get(op_num as usize)?;
        Some(self.data_region_offset + op.data_offset())
    }

    fn operations_for<'m>(&self, manifest: &'m DeltaArchiveManifest) -> Vec<&'m update_format_crau::proto::InstallOperation> {
        let rootfs: Vec<_> =
            if manifest.install_operations.is_empty() { manifest.partition_operations.iter().collect() } else { manifest.install_operations.iter().collect() };
        rootfs.into_iter().chain(manifest.kernel_install_operations.iter()).collect()
    }

    fn try_fast_forward(&mut self, target: u64) -> Result<bool, ErrorCode> {
        let remaining = (target - self.buffer_offset) as usize;
        if self.buffer.len() < remaining {
            return Ok(false);
        }
        self.discard_buffer(target);
        self.fast_forward_to = None;
        Ok(true)
    }

    /// Same shape as [`Self::try_fast_forward`], but for the span a prior
    /// attempt already folded into the restored hash contexts: those
    /// bytes are dropped from the buffer without being hashed again.
    fn try_skip_to(&mut self, target: u64) -> Result<bool, ErrorCode> {
        let remaining = (target - self.buffer_offset) as usize;
        if self.buffer.len() < remaining {
            return Ok(false);
        }
        self.skip_buffer(target);
        self.skip_to = None;
        Ok(true)
    }

    /// The trailing payload `Signatures` blob is not one of the manifest's
    /// install operations: it is a fixed-length span of raw bytes
    /// (`signatures_offset`/`signatures_size`, relative to the start of
    /// the data region) that follows the last operation's data. Read it
    /// directly once every operation has been applied, snapshotting the
    /// signed-hash context at the instant before its own bytes are
    /// absorbed into that stream.
    fn try_extract_trailing_signature(&mut self) -> Result<bool, ErrorCode> {
        let manifest = self.manifest.as_ref().expect("manifest parsed before applying operations");
        let absolute_start = self.data_region_offset + manifest.signatures_offset();
        let absolute_end = absolute_start + manifest.signatures_size();

        if self.buffer_offset < absolute_start {
            if (self.buffer.len() as u64) < absolute_start - self.buffer_offset {
                return Ok(false);
            }
            self.discard_buffer(absolute_start);
        }

        let needed = (absolute_end - self.buffer_offset) as usize;
        if self.buffer.len() < needed {
            return Ok(false);
        }

        let blob = self.buffer[..needed].to_vec();
        self.signed_hash_snapshot = Some(self.signed_hash.context());
        self.prefs.set_string(keys::SIGNED_SHA256_CONTEXT, self.signed_hash_snapshot.as_ref().unwrap());
        self.signature_blob = Some(blob.clone());
        self.prefs.set_string(keys::SIGNATURE_BLOB, &hex::encode(&blob));

        self.discard_buffer(absolute_end);
        self.state = State::Done;
        Ok(true)
    }

    fn try_apply_next_operation(&mut self) -> Result<bool, ErrorCode> {
        let op_num = self.next_operation_num;
        let manifest = self.manifest.as_ref().expect("manifest parsed before applying operations").clone();
        let ops = self.operations_for(&manifest);
        let op = *ops.get(op_num as usize).expect("operation index in range");
        let op = op.clone();

        let data_needed = op.data_length() as usize;
        if self.buffer.len() < data_needed {
            return Ok(false);
        }

        let data = self.buffer[..data_needed].to_vec();

        if !op.data_sha256_hash().is_empty() {
            use sha2::{Digest, Sha256};
            let got = Sha256::digest(&data);
            if got.as_slice() != op.data_sha256_hash() {
                if self.install_plan.hash_checks_mandatory {
                    return Err(self.fail(ErrorCode::DownloadOperationHashMismatch));
                }
                log::warn!("operation {op_num} hash mismatch, continuing (non-mandatory)");
            }
        }

        let is_rootfs = op_num < self.num_rootfs_operations;
        let (target_path, target_file): (&std::path::Path, &File) =
            if is_rootfs { (&self.install_plan.target_path, &self.target_file) } else { (&self.install_plan.kernel_target_path, &self.kernel_target_file) };
        let (source_path, source_file): (Option<&std::path::Path>, Option<&File>) = if is_rootfs {
            (self.install_plan.source_path.as_deref(), self.source_file.as_ref())
        } else {
            (self.install_plan.kernel_source_path.as_deref(), self.kernel_source_file.as_ref())
        };

        let block_size = manifest.block_size() as u64;

        let ctx = OperationContext { target_path, target_file, source_path, source_file, block_size };
        operation::execute(&op, &data, &ctx).map_err(|code| self.fail(code))?;

        let consumed_offset = self.buffer_offset + data_needed as u64;
        self.discard_buffer(consumed_offset);

        self.next_operation_num += 1;
        self.progress.record_operation_done(self.next_operation_num);
        self.progress.maybe_report(self.sink.as_mut(), Instant::now(), false);

        self.checkpoint();

        Ok(true)
    }

    fn checkpoint(&mut self) {
        let next_length = self
            .manifest
            .as_ref()
            .and_then(|m| self.operations_for(m).get(self.next_operation_num as usize).map(|op| op.data_length()))
            .unwrap_or(0);

        let sha256_context = self.hash.context();
        resume::checkpoint_update_progress(
            self.prefs,
            self.last_checkpointed_offset,
            &Checkpoint {
                next_operation: self.next_operation_num,
                next_data_offset: self.buffer_offset,
                next_data_length: next_length,
                sha256_context: &sha256_context,
            },
        );
        self.last_checkpointed_offset = self.buffer_offset;
    }

    /// Feeds the currently-buffered bytes (the first `advance_to -
    /// buffer_offset` bytes) into both hash streams, advances
    /// `buffer_offset`, and drops them from the buffer. The signed-hash
    /// stream stops absorbing once the trailing payload signature blob
    /// has been reached.
    fn discard_buffer(&mut self, advance_to: u64) {
        let len = (advance_to - self.buffer_offset) as usize;
        let (chunk, rest) = self.buffer.split_at(len);

        self.hash.update(chunk);
        if self.signature_blob.is_none() {
            self.signed_hash.update(chunk);
        }

        let rest = rest.to_vec();
        self.buffer = rest;
        self.buffer_offset = advance_to;
    }

    /// Drops the first `advance_to - buffer_offset` buffered bytes without
    /// feeding them into either hash stream.
    fn skip_buffer(&mut self, advance_to: u64) {
        let len = (advance_to - self.buffer_offset) as usize;
        let rest = self.buffer[len..].to_vec();
        self.buffer = rest;
        self.buffer_offset = advance_to;
    }

    /// Mirrors `VerifyPayload`: called once after the last `Write`.
    pub fn verify_payload(&mut self, expected_hash: &[u8], expected_total_size: u64) -> ErrorCode {
        if expected_total_size != self.buffer_offset {
            return ErrorCode::PayloadSizeMismatchError;
        }

        let got_hash = self.hash.clone().finish();
        if !expected_hash.is_empty() && got_hash.as_slice() != expected_hash {
            log::error!("whole-payload hash mismatch");
            return ErrorCode::PayloadHashMismatchError;
        }

        let public_key = match self.resolve_public_key() {
            Some(key) => key,
            None => {
                log::warn!("no public key configured, skipping payload signature verification");
                return ErrorCode::Success;
            }
        };

        let signature_blob = match &self.signature_blob {
            Some(blob) => blob.clone(),
            None => return ErrorCode::SignedDeltaPayloadExpectedError,
        };

        if self.manifest.is_none() {
            return ErrorCode::DownloadStateInitializationError;
        }
        let sig_message = match update_format_crau::proto::Signatures::parse_from_bytes(&signature_blob) {
            Ok(m) => m,
            Err(_) => return ErrorCode::DownloadPayloadVerificationError,
        };

        let signed_context = match &self.signed_hash_snapshot {
            Some(ctx) => ctx.clone(),
            None => return ErrorCode::DownloadPayloadVerificationError,
        };
        let signed_hash = match HashStream::from_context(&signed_context) {
            Ok(h) => h.finish(),
            Err(_) => return ErrorCode::DownloadPayloadVerificationError,
        };

        for sig in &sig_message.signatures {
            if verify_rsa_pkcs_prehash(&signed_hash, sig.data(), public_key.clone()).is_ok() {
                return ErrorCode::Success;
            }
        }

        log::error!("no signature in the payload verified against the configured public key");
        ErrorCode::DownloadPayloadPubKeyVerificationError
    }

    fn resolve_public_key(&self) -> Option<rsa::RsaPublicKey> {
        if let Some(path) = &self.install_plan.public_key_path {
            return get_public_key_pkcs_pem(path.to_str()?, KeyType::KeyTypePkcs8).ok();
        }
        if let Some(encoded) = &self.install_plan.public_key_rsa {
            let decoded = Base64::decode_to_vec(encoded, None).ok()?;
            let mut tmp = tempfile::NamedTempFile::new().ok()?;
            tmp.write_all(&decoded).ok()?;
            return get_public_key_pkcs_pem(tmp.path().to_str()?, KeyType::KeyTypePkcs8).ok();
        }
        None
    }

    fn validate_metadata_signature(&mut self, metadata_bytes: &[u8], signature_bytes: &[u8]) -> Result<(), ErrorCode> {
        let signature_bytes = if !signature_bytes.is_empty() {
            signature_bytes.to_vec()
        } else if !self.install_plan.metadata_signature.is_empty() {
            Base64::decode_to_vec(&self.install_plan.metadata_signature, None)
                .map_err(|_| self.fail(ErrorCode::DownloadMetadataSignatureError))?
        } else {
            return if self.install_plan.hash_checks_mandatory {
                Err(self.fail(ErrorCode::DownloadMetadataSignatureMissingError))
            } else {
                Ok(())
            };
        };

        let public_key = match self.resolve_public_key() {
            Some(key) => key,
            None => {
                log::warn!("no public key configured, skipping metadata signature validation");
                return Ok(());
            }
        };

        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(metadata_bytes);

        let sig_message = update_format_crau::proto::Signatures::parse_from_bytes(&signature_bytes)
            .map_err(|_| self.fail(ErrorCode::DownloadMetadataSignatureVerificationError))?;

        for sig in &sig_message.signatures {
            if verify_rsa_pkcs_prehash(&digest, sig.data(), public_key.clone()).is_ok() {
                return Ok(());
            }
        }

        if self.install_plan.hash_checks_mandatory {
            Err(self.fail(ErrorCode::DownloadMetadataSignatureMismatch))
        } else {
            log::warn!("metadata signature did not verify (non-mandatory)");
            Ok(())
        }
    }

    /// Mirrors `Close`: flushes both target file handles. Source handles
    /// need no flushing since they are read-only.
    pub fn close(mut self) -> Result<(), ErrorCode> {
        self.target_file.flush().map_err(|_| ErrorCode::DownloadOperationExecutionError)?;
        self.kernel_target_file.flush().map_err(|_| ErrorCode::DownloadOperationExecutionError)?;
        Ok(())
    }
}
