//! Transparent QFS compression for container entries
//!
//! Entries listed in the `DIR` record are stored QFS (RefPack) compressed.
//! Reads decompress on first access, saves recompress entries whose content
//! changed and reuse the stored bytes of everything else.
//!
//! **Stored layout**:
//! - `u32` little-endian total size of the stored payload (includes itself)
//! - flags byte (`0x10`, plus `0x80` for 4-byte sizes, `0x01` when a
//!   compressed size follows), magic `0xFB`
//! - decompressed size, big-endian, 3 bytes (4 with flag `0x80`)
//! - opcode stream
//!
//! **Opcodes** (`b0..b3` are the opcode bytes, literals follow the opcode and
//! are emitted before the back-reference is copied):
//!
//! ```text
//! 0x00-0x7F  2 bytes  literals b0&3          copy ((b0&0x1C)>>2)+3   offset ((b0&0x60)<<3)+b1+1
//! 0x80-0xBF  3 bytes  literals b1>>6         copy (b0&0x3F)+4        offset ((b1&0x3F)<<8)+b2+1
//! 0xC0-0xDF  4 bytes  literals b0&3          copy ((b0&0x0C)<<6)+b3+5 offset ((b0&0x10)<<12)+(b1<<8)+b2+1
//! 0xE0-0xFB  1 byte   literals ((b0&0x1F)<<2)+4
//! 0xFC-0xFF  1 byte   literals b0&3, end of stream
//! ```

use crate::core::error::{DbpfError, Result};
use serde::{Deserialize, Serialize};

/// Magic byte following the flags byte of a QFS stream
pub const QFS_MAGIC: u8 = 0xFB;

const FLAG_DEFAULT: u8 = 0x10;
const FLAG_COMPRESSED_SIZE: u8 = 0x01;
const FLAG_LARGE_SIZES: u8 = 0x80;

/// Length of the little-endian size prefix in front of the QFS header
const SIZE_PREFIX: usize = 4;

const WINDOW_SIZE: usize = 131_072;
const MIN_MATCH: usize = 3;
const MAX_MATCH: usize = 1028;
const MAX_LITERAL_RUN: usize = 112;
const MAX_PREALLOC: usize = 16 * 1024 * 1024;

const HASH_BITS: u32 = 16;
const NIL: usize = usize::MAX;

/// Compression method of a container entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionMethod {
    /// Stored as is
    None,
    /// QFS / RefPack
    Qfs,
}

/// Compression policy for entries that were not compressed before
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Compress new entries at all
    pub enabled: bool,

    /// Minimum size to compress (bytes)
    pub threshold: usize,

    /// Minimum compression ratio (compressed_size / original_size)
    /// If ratio is worse than this, store uncompressed
    pub min_ratio: f32,

    /// How many earlier positions the matcher inspects per byte
    pub max_chain: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        CompressionConfig {
            enabled: true,
            threshold: 64,
            min_ratio: 0.95,
            max_chain: 64,
        }
    }
}

impl CompressionConfig {
    /// Never compress new entries
    pub fn none() -> Self {
        CompressionConfig {
            enabled: false,
            threshold: usize::MAX,
            min_ratio: 0.0,
            ..Default::default()
        }
    }

    /// Short match chains, for large batch rewrites
    pub fn fast() -> Self {
        CompressionConfig {
            max_chain: 8,
            ..Default::default()
        }
    }

    /// Long match chains, smallest output
    pub fn thorough() -> Self {
        CompressionConfig {
            max_chain: 512,
            ..Default::default()
        }
    }
}

/// Parsed QFS header: declared decompressed size and start of the opcode stream
fn parse_header(data: &[u8]) -> Result<(usize, usize)> {
    if data.len() < SIZE_PREFIX + 5 {
        return Err(DbpfError::InvalidCompressionHeader);
    }
    let flags = data[SIZE_PREFIX];
    if data[SIZE_PREFIX + 1] != QFS_MAGIC || flags & FLAG_DEFAULT == 0 {
        return Err(DbpfError::InvalidCompressionHeader);
    }

    let width = if flags & FLAG_LARGE_SIZES != 0 { 4 } else { 3 };
    let mut pos = SIZE_PREFIX + 2;
    let size_bytes = data
        .get(pos..pos + width)
        .ok_or(DbpfError::InvalidCompressionHeader)?;
    let size = size_bytes
        .iter()
        .fold(0usize, |acc, &b| (acc << 8) | b as usize);
    pos += width;

    if flags & FLAG_COMPRESSED_SIZE != 0 {
        pos += width;
        if pos > data.len() {
            return Err(DbpfError::InvalidCompressionHeader);
        }
    }

    Ok((size, pos))
}

fn operand(data: &[u8], pos: usize, n: usize) -> Result<&[u8]> {
    data.get(pos + 1..pos + 1 + n)
        .ok_or(DbpfError::TruncatedStream(pos))
}

/// Whether a stored payload starts with a QFS header
pub fn is_compressed(data: &[u8]) -> bool {
    parse_header(data).is_ok()
}

/// Decompressed size declared by a stored payload's QFS header
pub fn declared_size(data: &[u8]) -> Result<usize> {
    parse_header(data).map(|(size, _)| size)
}

/// Decompress a stored payload, which must produce exactly `expected` bytes
pub fn decompress(data: &[u8], expected: usize) -> Result<Vec<u8>> {
    let (declared, mut pos) = parse_header(data)?;
    if declared != expected {
        return Err(DbpfError::SizeMismatch {
            expected,
            actual: declared,
        });
    }

    let mut out = Vec::with_capacity(expected.min(MAX_PREALLOC));
    loop {
        let Some(&b0) = data.get(pos) else {
            // Some writers omit the terminator once the output is complete.
            if out.len() == expected {
                break;
            }
            return Err(DbpfError::TruncatedStream(pos));
        };

        let (width, plain, copy, distance, last) = match b0 {
            0x00..=0x7F => {
                let b = operand(data, pos, 1)?;
                let b1 = b[0] as usize;
                let b0 = b0 as usize;
                let distance = ((b0 & 0x60) << 3) + b1 + 1;
                (2, b0 & 0x03, ((b0 & 0x1C) >> 2) + 3, distance, false)
            }
            0x80..=0xBF => {
                let b = operand(data, pos, 2)?;
                let (b1, b2) = (b[0] as usize, b[1] as usize);
                let distance = ((b1 & 0x3F) << 8) + b2 + 1;
                (3, b1 >> 6, (b0 as usize & 0x3F) + 4, distance, false)
            }
            0xC0..=0xDF => {
                let b = operand(data, pos, 3)?;
                let (b1, b2, b3) = (b[0] as usize, b[1] as usize, b[2] as usize);
                let b0 = b0 as usize;
                let distance = ((b0 & 0x10) << 12) + (b1 << 8) + b2 + 1;
                let copy = ((b0 & 0x0C) << 6) + b3 + 5;
                (4, b0 & 0x03, copy, distance, false)
            }
            0xE0..=0xFB => (1, ((b0 as usize & 0x1F) << 2) + 4, 0, 0, false),
            0xFC..=0xFF => (1, b0 as usize & 0x03, 0, 0, true),
        };
        pos += width;

        let literals = data
            .get(pos..pos + plain)
            .ok_or(DbpfError::TruncatedStream(pos))?;
        if out.len() + plain > expected {
            return Err(DbpfError::OutputOverrun(expected));
        }
        out.extend_from_slice(literals);
        pos += plain;

        if copy > 0 {
            if distance > out.len() {
                return Err(DbpfError::InvalidBackReference {
                    position: out.len(),
                    distance,
                });
            }
            if out.len() + copy > expected {
                return Err(DbpfError::OutputOverrun(expected));
            }
            let start = out.len() - distance;
            // Byte by byte: source and destination may overlap.
            for i in start..start + copy {
                let byte = out[i];
                out.push(byte);
            }
        }

        if last {
            break;
        }
    }

    if out.len() != expected {
        return Err(DbpfError::SizeMismatch {
            expected,
            actual: out.len(),
        });
    }
    Ok(out)
}

fn hash(window: &[u8]) -> usize {
    let key = (window[0] as u32) << 16 | (window[1] as u32) << 8 | window[2] as u32;
    (key.wrapping_mul(2_654_435_761) >> (32 - HASH_BITS)) as usize
}

fn encodable(len: usize, distance: usize) -> bool {
    (len >= 3 && len <= 10 && distance <= 1024)
        || (len >= 4 && len <= 67 && distance <= 16_384)
        || (len >= 5 && len <= MAX_MATCH && distance <= WINDOW_SIZE)
}

/// Emit literal runs until at most three bytes are left; returns the rest.
fn flush_literals<'a>(out: &mut Vec<u8>, mut literals: &'a [u8]) -> &'a [u8] {
    while literals.len() >= 4 {
        let n = (literals.len() & !3).min(MAX_LITERAL_RUN);
        out.push(0xE0 + ((n - 4) >> 2) as u8);
        out.extend_from_slice(&literals[..n]);
        literals = &literals[n..];
    }
    literals
}

fn emit_match(out: &mut Vec<u8>, plain: &[u8], len: usize, distance: usize) {
    let p = plain.len() as u8;
    let o = distance - 1;
    if len <= 10 && distance <= 1024 {
        let l = (len - 3) as u8;
        out.push(((o >> 3) & 0x60) as u8 | (l << 2) | p);
        out.push(o as u8);
    } else if len <= 67 && distance <= 16_384 {
        out.push(0x80 | (len - 4) as u8);
        out.push((p << 6) | (o >> 8) as u8);
        out.push(o as u8);
    } else {
        let l = len - 5;
        out.push(0xC0 | ((o >> 12) & 0x10) as u8 | ((l >> 6) & 0x0C) as u8 | p);
        out.push((o >> 8) as u8);
        out.push(o as u8);
        out.push(l as u8);
    }
    out.extend_from_slice(plain);
}

struct Matcher<'a> {
    data: &'a [u8],
    head: Vec<usize>,
    prev: Vec<usize>,
    max_chain: usize,
}

impl<'a> Matcher<'a> {
    fn new(data: &'a [u8], max_chain: usize) -> Self {
        Matcher {
            data,
            head: vec![NIL; 1 << HASH_BITS],
            prev: vec![NIL; data.len()],
            max_chain: max_chain.max(1),
        }
    }

    fn insert(&mut self, pos: usize) {
        if pos + MIN_MATCH <= self.data.len() {
            let h = hash(&self.data[pos..]);
            self.prev[pos] = self.head[h];
            self.head[h] = pos;
        }
    }

    /// Longest encodable match for `pos` as `(length, distance)`
    fn longest(&self, pos: usize) -> Option<(usize, usize)> {
        let data = self.data;
        let limit = (data.len() - pos).min(MAX_MATCH);
        if limit < MIN_MATCH {
            return None;
        }

        let mut best: Option<(usize, usize)> = None;
        let mut candidate = self.head[hash(&data[pos..])];
        let mut chain = 0;
        while candidate != NIL && chain < self.max_chain {
            let distance = pos - candidate;
            if distance > WINDOW_SIZE {
                break;
            }
            let len = data[candidate..]
                .iter()
                .zip(&data[pos..pos + limit])
                .take_while(|(a, b)| a == b)
                .count();
            if encodable(len, distance) && best.map_or(true, |(l, _)| len > l) {
                best = Some((len, distance));
                if len == limit {
                    break;
                }
            }
            candidate = self.prev[candidate];
            chain += 1;
        }
        best
    }
}

/// Compress with the default match search depth
pub fn compress(data: &[u8]) -> Vec<u8> {
    compress_with(data, CompressionConfig::default().max_chain)
}

/// Compress into a stored payload (size prefix + QFS header + opcodes)
pub fn compress_with(data: &[u8], max_chain: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 2 + 16);
    out.extend_from_slice(&[0u8; SIZE_PREFIX]);
    if data.len() > 0xFF_FFFF {
        out.push(FLAG_DEFAULT | FLAG_LARGE_SIZES);
        out.push(QFS_MAGIC);
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    } else {
        out.push(FLAG_DEFAULT);
        out.push(QFS_MAGIC);
        out.extend_from_slice(&(data.len() as u32).to_be_bytes()[1..]);
    }

    let mut matcher = Matcher::new(data, max_chain);
    let mut pos = 0;
    let mut literal_start = 0;
    while pos + MIN_MATCH <= data.len() {
        match matcher.longest(pos) {
            Some((len, distance)) => {
                let plain = flush_literals(&mut out, &data[literal_start..pos]);
                emit_match(&mut out, plain, len, distance);
                for p in pos..pos + len {
                    matcher.insert(p);
                }
                pos += len;
                literal_start = pos;
            }
            None => {
                matcher.insert(pos);
                pos += 1;
            }
        }
    }

    let rest = flush_literals(&mut out, &data[literal_start..]);
    out.push(0xFC | rest.len() as u8);
    out.extend_from_slice(rest);

    let total = out.len() as u32;
    out[..SIZE_PREFIX].copy_from_slice(&total.to_le_bytes());
    out
}

/// Compress data if beneficial, returns (data, method_used)
pub fn compress_if_beneficial(
    data: &[u8],
    config: &CompressionConfig,
) -> (Vec<u8>, CompressionMethod) {
    if !config.enabled || data.len() < config.threshold {
        return (data.to_vec(), CompressionMethod::None);
    }

    let compressed = compress_with(data, config.max_chain);
    let ratio = compressed.len() as f32 / data.len() as f32;
    if ratio < config.min_ratio {
        (compressed, CompressionMethod::Qfs)
    } else {
        (data.to_vec(), CompressionMethod::None)
    }
}
