//! Incremental SHA-256 that can be snapshotted to a string and restored,
//! so a payload hash can survive a process restart mid-update.

use sha2::compress256;
use sha2::digest::generic_array::GenericArray;

const BLOCK_LEN: usize = 64;
const STATE_WORDS: usize = 8;

const INITIAL_STATE: [u32; STATE_WORDS] = [
    0x6a09e667, 0xbb67ae85, 0x3c6ef372, 0xa54ff53a, 0x510e527f, 0x9b05688c, 0x1f83d9ab, 0x5be0cd19,
];

#[derive(Debug)]
pub enum Error {
    MalformedContext,
    BufferTooLarge(usize),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::MalformedContext => write!(f, "malformed hash stream context"),
            Error::BufferTooLarge(n) => write!(f, "buffered tail of {n} bytes exceeds one block"),
        }
    }
}

/// A resumable SHA-256 digest. Unlike `sha2::Sha256`, its intermediate
/// state can be exported as a string (via [`HashStream::context`]) and
/// restored later (via [`HashStream::from_context`]), so it survives
/// being persisted to a preferences store between process restarts.
#[derive(Clone)]
pub struct HashStream {
    state: [u32; STATE_WORDS],
    buffer: Vec<u8>,
    total_len: u64,
}

impl Default for HashStream {
    fn default() -> Self {
        Self::new()
    }
}

impl HashStream {
    pub fn new() -> Self {
        HashStream {
            state: INITIAL_STATE,
            buffer: Vec::with_capacity(BLOCK_LEN),
            total_len: 0,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.total_len = self.total_len.wrapping_add(data.len() as u64);

        let mut data = data;
        if !self.buffer.is_empty() {
            let need = BLOCK_LEN - self.buffer.len();
            let take = need.min(data.len());
            self.buffer.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.buffer.len() == BLOCK_LEN {
                self.compress_buffered();
            }
        }

        let full_blocks = data.len() / BLOCK_LEN;
        if full_blocks > 0 {
            let (blocks, rest) = data.split_at(full_blocks * BLOCK_LEN);
            let block_refs: Vec<GenericArray<u8, _>> =
                blocks.chunks_exact(BLOCK_LEN).map(GenericArray::clone_from_slice).collect();
            compress256(&mut self.state, &block_refs);
            data = rest;
        }

        if !data.is_empty() {
            self.buffer.extend_from_slice(data);
        }
    }

    fn compress_buffered(&mut self) {
        let block = GenericArray::clone_from_slice(&self.buffer);
        compress256(&mut self.state, std::slice::from_ref(&block));
        self.buffer.clear();
    }

    /// Serializes the current state, total length consumed so far, and
    /// any not-yet-compressed tail bytes into a hex string suitable for
    /// a preferences store value.
    pub fn context(&self) -> String {
        let mut out = String::with_capacity(16 + 16 + self.buffer.len() * 2 + STATE_WORDS * 8);
        out.push_str(&hex::encode(self.total_len.to_be_bytes()));
        for word in self.state {
            out.push_str(&hex::encode(word.to_be_bytes()));
        }
        out.push_str(&hex::encode(&self.buffer));
        out
    }

    pub fn from_context(ctx: &str) -> Result<Self, Error> {
        let raw = hex::decode(ctx).map_err(|_| Error::MalformedContext)?;
        if raw.len() < 8 + STATE_WORDS * 4 {
            return Err(Error::MalformedContext);
        }
        let total_len = u64::from_be_bytes(raw[0..8].try_into().map_err(|_| Error::MalformedContext)?);

        let mut state = [0u32; STATE_WORDS];
        for (i, word) in state.iter_mut().enumerate() {
            let off = 8 + i * 4;
            *word = u32::from_be_bytes(raw[off..off + 4].try_into().map_err(|_| Error::MalformedContext)?);
        }

        let buffer = raw[8 + STATE_WORDS * 4..].to_vec();
        if buffer.len() >= BLOCK_LEN {
            return Err(Error::BufferTooLarge(buffer.len()));
        }

        Ok(HashStream { state, buffer, total_len })
    }

    /// Finalizes the digest, consuming this stream. Matches SHA-256's
    /// standard Merkle-Damgard padding: an 0x80 byte, zero padding, then
    /// the 64-bit big-endian bit length.
    pub fn finish(mut self) -> [u8; 32] {
        let bit_len = self.total_len.wrapping_mul(8);

        self.buffer.push(0x80);
        while self.buffer.len() % BLOCK_LEN != BLOCK_LEN - 8 {
            self.buffer.push(0);
        }
        self.buffer.extend_from_slice(&bit_len.to_be_bytes());
        let blocks: Vec<GenericArray<u8, _>> =
            self.buffer.chunks_exact(BLOCK_LEN).map(GenericArray::clone_from_slice).collect();
        compress256(&mut self.state, &blocks);

        let mut out = [0u8; 32];
        for (i, word) in self.state.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&word.to_be_bytes());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};

    #[test]
    fn matches_reference_digest() {
        let mut hs = HashStream::new();
        hs.update(b"hello ");
        hs.update(b"world, this message is long enough to span more than one sixty-four byte block of input");
        let got = hs.finish();

        let mut reference = Sha256::new();
        reference.update(b"hello ");
        reference.update(b"world, this message is long enough to span more than one sixty-four byte block of input");
        let want = reference.finalize();

        assert_eq!(&got[..], want.as_slice());
    }

    #[test]
    fn context_round_trips() {
        let mut hs = HashStream::new();
        hs.update(b"first chunk of data that is deliberately not block aligned");

        let ctx = hs.context();
        let mut restored = HashStream::from_context(&ctx).unwrap();

        hs.update(b" second chunk");
        restored.update(b" second chunk");

        assert_eq!(hs.finish(), restored.finish());
    }

    #[test]
    fn empty_input_matches_known_answer() {
        let hs = HashStream::new();
        let got = hs.finish();
        let want = Sha256::digest(b"");
        assert_eq!(&got[..], want.as_slice());
    }
}
