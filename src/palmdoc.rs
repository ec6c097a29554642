//! PalmDOC sliding-window compression
//!
//! Each text record is compressed independently in chunks of at most
//! [`MAX_CHUNK_SIZE`] bytes. The output is a stream of control bytes:
//!
//! ```text
//! 0x00, 0x09..=0x7F   literal byte
//! 0x01..=0x08         copy the next N bytes verbatim (any byte values)
//! 0x80..=0xBF         with the next byte: 10 | distance:11 | length-3:3
//! 0xC0..=0xFF         space followed by (byte & 0x7F)
//! ```

use crate::error::{MobiError, Result};
use std::collections::HashMap;

/// Largest chunk compressed as one unit (one text record)
pub const MAX_CHUNK_SIZE: usize = 4096;

/// Largest backward distance the 11-bit field can hold
pub const MAX_DISTANCE: usize = 0x07FF;

/// Shortest back-reference worth encoding
pub const MIN_MATCH: usize = 3;

/// Longest back-reference (3-bit length field + 3)
pub const MAX_MATCH: usize = 10;

/// Longest verbatim run behind a 0x01..=0x08 count byte
pub const MAX_RAW_RUN: usize = 8;

/// Compress data chunk by chunk
///
/// Inputs longer than [`MAX_CHUNK_SIZE`] are encoded as consecutive chunks
/// with no back-references across chunk boundaries.
pub fn compress(data: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(data.len());
    for chunk in data.chunks(MAX_CHUNK_SIZE) {
        compress_chunk(chunk, &mut output);
    }
    output
}

/// Split a body into records of at most `record_size` bytes and compress each
///
/// # Arguments
/// * `body` - Uncompressed text
/// * `record_size` - Uncompressed size of every record but the last (≤ 4096)
///
/// # Returns
/// One compressed buffer per record, in order, or `InvalidConfig` when
/// `record_size` is outside `1..=4096`
pub fn compress_records(body: &[u8], record_size: usize) -> Result<Vec<Vec<u8>>> {
    if record_size == 0 || record_size > MAX_CHUNK_SIZE {
        return Err(MobiError::InvalidConfig(format!(
            "record_size must be within 1..={}, got {}",
            MAX_CHUNK_SIZE, record_size
        )));
    }
    Ok(body.chunks(record_size).map(compress).collect())
}

/// Decompress a PalmDOC stream
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(data.len() * 2);
    let mut i = 0;

    while i < data.len() {
        let control = data[i];
        i += 1;

        match control {
            0xC0..=0xFF => {
                output.push(b' ');
                output.push(control & 0x7F);
            }
            0x80..=0xBF => {
                let low = *data.get(i).ok_or_else(|| {
                    MobiError::DecompressionFailed(format!(
                        "back-reference at byte {} is truncated",
                        i - 1
                    ))
                })?;
                i += 1;

                let pair = u16::from_be_bytes([control, low]);
                let distance = usize::from((pair >> 3) & 0x07FF);
                let length = usize::from(pair & 0x07) + MIN_MATCH;
                if distance == 0 || distance > output.len() {
                    return Err(MobiError::DecompressionFailed(format!(
                        "back-reference distance {} outside {} decoded bytes",
                        distance,
                        output.len()
                    )));
                }

                // Byte at a time: the source may overlap the bytes being produced
                let start = output.len() - distance;
                for k in 0..length {
                    let byte = output[start + k];
                    output.push(byte);
                }
            }
            0x01..=0x08 => {
                let count = usize::from(control);
                let run = data.get(i..i + count).ok_or_else(|| {
                    MobiError::DecompressionFailed(format!(
                        "raw run of {} bytes at byte {} is truncated",
                        count,
                        i - 1
                    ))
                })?;
                output.extend_from_slice(run);
                i += count;
            }
            // 0x00 and 0x09..=0x7F
            _ => output.push(control),
        }
    }

    Ok(output)
}

/// Bytes the decoder reads back as themselves
fn is_plain(byte: u8) -> bool {
    byte == 0x00 || (0x09..0x7F).contains(&byte)
}

fn compress_chunk(chunk: &[u8], output: &mut Vec<u8>) {
    let mut finder = MatchFinder::new(chunk);
    let mut raw: Vec<u8> = Vec::with_capacity(MAX_RAW_RUN);
    let mut i = 0;

    while i < chunk.len() {
        let byte = chunk[i];

        if byte == b' ' {
            if let Some(&next) = chunk.get(i + 1) {
                if (0x40..0x7F).contains(&next) {
                    flush_raw(&mut raw, output);
                    output.push(next ^ 0x80);
                    i += 2;
                    continue;
                }
            }
        }

        if let Some((distance, length)) = finder.longest_match(i) {
            flush_raw(&mut raw, output);
            let token = 0x8000 | ((distance as u16) << 3) | (length - MIN_MATCH) as u16;
            output.extend_from_slice(&token.to_be_bytes());
            i += length;
            continue;
        }

        // Once a run is open, plain bytes join it until it fills
        if is_plain(byte) && raw.is_empty() {
            output.push(byte);
        } else {
            raw.push(byte);
            if raw.len() == MAX_RAW_RUN {
                flush_raw(&mut raw, output);
            }
        }
        i += 1;
    }

    flush_raw(&mut raw, output);
}

fn flush_raw(raw: &mut Vec<u8>, output: &mut Vec<u8>) {
    if !raw.is_empty() {
        output.push(raw.len() as u8);
        output.append(raw);
    }
}

/// Hash chains over 3-byte prefixes of one chunk
///
/// Positions are indexed lazily as the scan passes them, so a lookup at `i`
/// only ever sees earlier positions of the same chunk.
struct MatchFinder<'a> {
    data: &'a [u8],
    head: HashMap<[u8; 3], usize>,
    prev: Vec<Option<usize>>,
    indexed: usize,
}

impl<'a> MatchFinder<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            head: HashMap::new(),
            prev: vec![None; data.len()],
            indexed: 0,
        }
    }

    fn prefix(&self, pos: usize) -> Option<[u8; 3]> {
        self.data
            .get(pos..pos + MIN_MATCH)
            .map(|p| [p[0], p[1], p[2]])
    }

    fn index_until(&mut self, pos: usize) {
        while self.indexed < pos {
            if let Some(key) = self.prefix(self.indexed) {
                self.prev[self.indexed] = self.head.insert(key, self.indexed);
            }
            self.indexed += 1;
        }
    }

    /// Longest earlier match starting at `pos`, as (distance, length).
    /// Candidates are visited nearest first, so ties keep the smallest distance.
    fn longest_match(&mut self, pos: usize) -> Option<(usize, usize)> {
        self.index_until(pos);
        let key = self.prefix(pos)?;
        let limit = MAX_MATCH.min(self.data.len() - pos);

        let mut best: Option<(usize, usize)> = None;
        let mut candidate = self.head.get(&key).copied();
        while let Some(start) = candidate {
            let distance = pos - start;
            if distance > MAX_DISTANCE {
                break;
            }
            let length = (0..limit)
                .take_while(|&k| self.data[start + k] == self.data[pos + k])
                .count();
            if length >= MIN_MATCH && best.map_or(true, |(_, len)| length > len) {
                best = Some((distance, length));
                if length == limit {
                    break;
                }
            }
            candidate = self.prev[start];
        }
        best
    }
}
