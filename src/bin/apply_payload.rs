use std::error::Error;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use argh::FromArgs;
use ue_performer::prefs::FilePrefs;
use ue_performer::{DeltaPerformer, InstallPlan};

const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

#[derive(FromArgs, Debug)]
/// Apply a CrAU update payload to a pair of target partitions.
struct Args {
    /// path to the payload file to apply
    #[argh(option, short = 'i')]
    payload: PathBuf,

    /// path to the target rootfs partition
    #[argh(option)]
    target_rootfs: PathBuf,

    /// path to the target kernel partition
    #[argh(option)]
    target_kernel: PathBuf,

    /// path to the current rootfs partition, required for a delta payload
    #[argh(option)]
    source_rootfs: Option<PathBuf>,

    /// path to the current kernel partition, required for a delta payload
    #[argh(option)]
    source_kernel: Option<PathBuf>,

    /// path to the PEM-encoded RSA public key used to verify the payload signature
    #[argh(option)]
    public_key: Option<PathBuf>,

    /// directory used to persist resume checkpoints across runs
    #[argh(option)]
    prefs_dir: PathBuf,

    /// identity of this payload, used to recognize a resumable checkpoint
    #[argh(option)]
    payload_id: String,

    /// expected SHA-256 of the full payload, hex-encoded
    #[argh(option)]
    payload_hash: Option<String>,

    /// total size in bytes of the payload
    #[argh(option)]
    payload_size: u64,

    /// fail immediately on any hash or signature mismatch instead of logging and continuing
    #[argh(switch)]
    hash_checks_mandatory: bool,

    /// bytes to read from the payload file per `Write` call
    #[argh(option, default = "DEFAULT_CHUNK_SIZE")]
    chunk_size: usize,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args: Args = argh::from_env();
    log::info!("applying payload {:?}", args.payload);

    let is_full_update = args.source_rootfs.is_none();

    let install_plan = InstallPlan {
        payload_size: args.payload_size,
        payload_hash: args.payload_hash.map(|h| hex::decode(h).unwrap_or_default()).unwrap_or_default(),
        metadata_size: None,
        metadata_signature: String::new(),
        is_full_update,
        source_path: args.source_rootfs,
        kernel_source_path: args.source_kernel,
        target_path: args.target_rootfs,
        kernel_target_path: args.target_kernel,
        public_key_rsa: None,
        public_key_path: args.public_key,
        hash_checks_mandatory: args.hash_checks_mandatory,
        source_rootfs_hash: Vec::new(),
        source_kernel_hash: Vec::new(),
    };

    let mut prefs = FilePrefs::new(&args.prefs_dir)?;
    let mut performer = DeltaPerformer::open(&mut prefs, &install_plan, args.payload_id)?;

    let mut payload_file = File::open(&args.payload)?;
    let mut buf = vec![0u8; args.chunk_size];
    loop {
        let n = payload_file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        if let Err(code) = performer.write(&buf[..n]) {
            return Err(format!("failed to apply payload: {code}").into());
        }
    }

    let expected_hash = install_plan.payload_hash.clone();
    let verify_result = performer.verify_payload(&expected_hash, install_plan.payload_size);
    if verify_result != ue_performer::ErrorCode::Success {
        return Err(format!("payload verification failed: {verify_result}").into());
    }

    performer.close()?;

    println!("payload applied and verified successfully");
    Ok(())
}
