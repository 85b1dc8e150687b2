//! Dispatches and executes one install operation against target (and,
//! for delta operations, source) partition files. Grounded in
//! `DeltaPerformer::Perform{Replace,Move,SourceCopy,Bsdiff,SourceBsdiff}Operation`
//! and `DeltaPerformer::ExtentsToBsdiffPositionsString`.

use std::fs::File;
use std::io::Write as IoWrite;
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::process::Command;

use update_format_crau::extent_writer::{BzipExtentWriter, DirectExtentWriter, ExtentWriter, ZeroPadExtentWriter, SPARSE_HOLE};
use update_format_crau::proto::install_operation::Type as OpType;
use update_format_crau::proto::{Extent, InstallOperation};

use crate::error::ErrorCode;

const BSPATCH_PATH: &str = "bspatch";

pub struct OperationContext<'a> {
    pub target_path: &'a Path,
    pub target_file: &'a File,
    pub source_path: Option<&'a Path>,
    pub source_file: Option<&'a File>,
    pub block_size: u64,
}

pub fn extents_to_blocks(extents: &[Extent]) -> u64 {
    extents.iter().map(|e| e.num_blocks()).sum()
}

/// Mirrors `ExtentsToBsdiffPositionsString`: a comma-separated list of
/// `start:len` segments (in bytes), capped at `total_length`, with a
/// sparse hole rendered as `-1:len`. The trailing comma is not emitted.
pub fn extents_to_bsdiff_positions_string(extents: &[Extent], block_size: u64, total_length: u64) -> String {
    let mut out = String::new();
    let mut remaining = total_length;

    for extent in extents {
        if remaining == 0 {
            break;
        }
        let extent_bytes = (extent.num_blocks() * block_size).min(remaining);
        if extent.start_block() == SPARSE_HOLE {
            out.push_str(&format!("-1:{extent_bytes},"));
        } else {
            out.push_str(&format!("{}:{extent_bytes},", extent.start_block() * block_size));
        }
        remaining -= extent_bytes;
    }

    if out.ends_with(',') {
        out.pop();
    }
    out
}

pub fn execute(op: &InstallOperation, data: &[u8], ctx: &OperationContext) -> Result<(), ErrorCode> {
    match op.type_() {
        OpType::REPLACE => perform_replace(op, data, ctx, false),
        OpType::REPLACE_BZ => perform_replace(op, data, ctx, true),
        OpType::MOVE => perform_move(op, ctx),
        OpType::SOURCE_COPY => perform_source_copy(op, ctx),
        OpType::BSDIFF => perform_patch(op, data, ctx, false),
        OpType::SOURCE_BSDIFF => perform_patch(op, data, ctx, true),
    }
}

fn perform_replace(op: &InstallOperation, data: &[u8], ctx: &OperationContext, compressed: bool) -> Result<(), ErrorCode> {
    let direct = DirectExtentWriter::new(ctx.target_file, ctx.block_size, &op.dst_extents).map_err(log_writer_err)?;
    let padded = ZeroPadExtentWriter::new(direct, ctx.block_size);

    if compressed {
        let mut bz = BzipExtentWriter::new(padded);
        bz.write(data).map_err(log_writer_err)?;
        bz.end().map_err(log_writer_err)
    } else {
        let mut padded = padded;
        padded.write(data).map_err(log_writer_err)?;
        padded.end().map_err(log_writer_err)
    }
}

fn log_writer_err<E: std::fmt::Display>(err: E) -> ErrorCode {
    log::error!("failed to execute install operation: {err}");
    ErrorCode::DownloadOperationExecutionError
}

/// In-partition copy: reads every source extent into one buffer before
/// writing any destination extent, so overlapping source/destination
/// regions are well defined regardless of direction.
fn perform_move(op: &InstallOperation, ctx: &OperationContext) -> Result<(), ErrorCode> {
    if extents_to_blocks(&op.src_extents) != extents_to_blocks(&op.dst_extents) {
        log::error!("MOVE operation src/dst block counts differ");
        return Err(ErrorCode::DownloadOperationExecutionError);
    }

    let mut buf = Vec::new();
    for extent in &op.src_extents {
        if extent.start_block() == SPARSE_HOLE {
            log::error!("sparse hole used as MOVE source");
            return Err(ErrorCode::DownloadOperationExecutionError);
        }
        let mut chunk = vec![0u8; (extent.num_blocks() * ctx.block_size) as usize];
        ctx.target_file.read_exact_at(&mut chunk, extent.start_block() * ctx.block_size).map_err(log_writer_err)?;
        buf.extend_from_slice(&chunk);
    }

    let direct = DirectExtentWriter::new(ctx.target_file, ctx.block_size, &op.dst_extents).map_err(log_writer_err)?;
    let mut writer = ZeroPadExtentWriter::new(direct, ctx.block_size);
    writer.write(&buf).map_err(log_writer_err)?;
    writer.end().map_err(log_writer_err)
}

/// Cross-partition copy, one block at a time, from the read-only source
/// handle to the target handle.
fn perform_source_copy(op: &InstallOperation, ctx: &OperationContext) -> Result<(), ErrorCode> {
    let source = ctx.source_file.ok_or_else(|| {
        log::error!("SOURCE_COPY requires a source partition");
        ErrorCode::DownloadOperationExecutionError
    })?;

    if op.src_length() % ctx.block_size != 0 || op.dst_length() % ctx.block_size != 0 {
        log::error!("SOURCE_COPY length not block-aligned");
        return Err(ErrorCode::DownloadOperationExecutionError);
    }

    let mut buf = vec![0u8; ctx.block_size as usize];
    let dst_blocks = flatten_extents(&op.dst_extents);
    let src_blocks = flatten_extents(&op.src_extents);

    if dst_blocks.len() != src_blocks.len() {
        log::error!("SOURCE_COPY src/dst block counts differ");
        return Err(ErrorCode::DownloadOperationExecutionError);
    }

    for (src_block, dst_block) in src_blocks.into_iter().zip(dst_blocks) {
        source.read_exact_at(&mut buf, src_block * ctx.block_size).map_err(log_writer_err)?;
        ctx.target_file.write_all_at(&buf, dst_block * ctx.block_size).map_err(log_writer_err)?;
    }

    Ok(())
}

fn flatten_extents(extents: &[Extent]) -> Vec<u64> {
    let mut blocks = Vec::new();
    for extent in extents {
        for i in 0..extent.num_blocks() {
            blocks.push(extent.start_block() + i);
        }
    }
    blocks
}

/// Runs the buffered patch bytes through the external `bspatch` tool
/// against the same partition file (BSDIFF) or a distinct source
/// partition (SOURCE_BSDIFF), then zero-pads a trailing partial
/// destination block.
fn perform_patch(op: &InstallOperation, data: &[u8], ctx: &OperationContext, source_variant: bool) -> Result<(), ErrorCode> {
    let src_path = if source_variant {
        ctx.source_path.ok_or_else(|| {
            log::error!("SOURCE_BSDIFF requires a source partition path");
            ErrorCode::DownloadOperationExecutionError
        })?
    } else {
        ctx.target_path
    };

    let mut patch_file = tempfile::NamedTempFile::new().map_err(log_writer_err)?;
    patch_file.write_all(data).map_err(log_writer_err)?;
    patch_file.flush().map_err(log_writer_err)?;

    let input_positions = extents_to_bsdiff_positions_string(&op.src_extents, ctx.block_size, op.src_length());
    let output_positions = extents_to_bsdiff_positions_string(&op.dst_extents, ctx.block_size, op.dst_length());

    let status = Command::new(BSPATCH_PATH)
        .arg(src_path)
        .arg(ctx.target_path)
        .arg(patch_file.path())
        .arg(&input_positions)
        .arg(&output_positions)
        .status()
        .map_err(log_writer_err)?;

    if !status.success() {
        log::error!("bspatch exited with {status}");
        return Err(ErrorCode::DownloadOperationExecutionError);
    }

    let remainder = op.dst_length() % ctx.block_size;
    if remainder != 0 {
        zero_pad_tail(ctx.target_file, &op.dst_extents, ctx.block_size, op.dst_length())?;
    }

    Ok(())
}

fn zero_pad_tail(target: &File, dst_extents: &[Extent], block_size: u64, dst_length: u64) -> Result<(), ErrorCode> {
    let total_blocks = extents_to_blocks(dst_extents);
    let used_bytes = dst_length;
    let pad_len = total_blocks * block_size - used_bytes;
    if pad_len == 0 {
        return Ok(());
    }

    let tail_offset = find_byte_offset(dst_extents, block_size, used_bytes).ok_or_else(|| {
        log::error!("failed to locate trailing block for zero padding");
        ErrorCode::DownloadOperationExecutionError
    })?;

    target.write_all_at(&vec![0u8; pad_len as usize], tail_offset).map_err(log_writer_err)
}

fn find_byte_offset(extents: &[Extent], block_size: u64, mut byte_offset: u64) -> Option<u64> {
    for extent in extents {
        let extent_bytes = extent.num_blocks() * block_size;
        if byte_offset < extent_bytes {
            return Some(extent.start_block() * block_size + byte_offset);
        }
        byte_offset -= extent_bytes;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(start_block: u64, num_blocks: u64) -> Extent {
        let mut e = Extent::new();
        e.set_start_block(start_block);
        e.set_num_blocks(num_blocks);
        e
    }

    #[test]
    fn bsdiff_positions_string_matches_format() {
        let extents = vec![extent(4, 2), extent(SPARSE_HOLE, 1)];
        let s = extents_to_bsdiff_positions_string(&extents, 8, 8 * 2 + 8);
        assert_eq!(s, "32:16,-1:8");
    }

    #[test]
    fn bsdiff_positions_string_caps_at_total_length() {
        let extents = vec![extent(0, 4)];
        let s = extents_to_bsdiff_positions_string(&extents, 8, 16);
        assert_eq!(s, "0:16");
    }

    #[test]
    fn flatten_extents_enumerates_every_block() {
        let extents = vec![extent(0, 2), extent(10, 1)];
        assert_eq!(flatten_extents(&extents), vec![0, 1, 10]);
    }
}
