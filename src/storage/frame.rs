//! Commit frame codec
//!
//! Every committed write transaction becomes exactly one frame:
//!
//! ```text
//! +------------------+
//! | Frame Length     | (u32 LE, whole frame including this field)
//! +------------------+
//! | Sequence         | (u64 LE, store sequence after this commit)
//! +------------------+
//! | Op Count         | (u32 LE)
//! +------------------+
//! | Ops              | tag u8 | id u64 LE | [value len u32 LE | value] (put only)
//! +------------------+
//! | Checksum         | (u32 LE, CRC32 of every preceding byte)
//! +------------------+
//! ```

use std::io::{self, Cursor, Read};

use crc32fast::Hasher;

const TAG_PUT: u8 = 1;
const TAG_DELETE: u8 = 2;

/// Length + sequence + op count + checksum.
pub const MIN_FRAME_SIZE: usize = 4 + 8 + 4 + 4;

/// Computes the CRC32 (IEEE) checksum of `data`.
pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// One mutation inside a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOp {
    Put { id: u64, value: Vec<u8> },
    Delete { id: u64 },
}

/// A committed write transaction as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommitFrame {
    /// Store sequence once this commit is applied
    pub sequence: u64,
    /// Mutations in the order they were applied
    pub ops: Vec<FrameOp>,
}

impl CommitFrame {
    pub fn new(sequence: u64, ops: Vec<FrameOp>) -> Self {
        Self { sequence, ops }
    }

    /// Serialize the complete frame to bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&self.sequence.to_le_bytes());
        body.extend_from_slice(&(self.ops.len() as u32).to_le_bytes());

        for op in &self.ops {
            match op {
                FrameOp::Put { id, value } => {
                    body.push(TAG_PUT);
                    body.extend_from_slice(&id.to_le_bytes());
                    body.extend_from_slice(&(value.len() as u32).to_le_bytes());
                    body.extend_from_slice(value);
                }
                FrameOp::Delete { id } => {
                    body.push(TAG_DELETE);
                    body.extend_from_slice(&id.to_le_bytes());
                }
            }
        }

        let frame_length = (4 + body.len() + 4) as u32;

        let mut frame = Vec::with_capacity(frame_length as usize);
        frame.extend_from_slice(&frame_length.to_le_bytes());
        frame.extend_from_slice(&body);
        let checksum = compute_checksum(&frame);
        frame.extend_from_slice(&checksum.to_le_bytes());

        frame
    }

    /// Deserialize a frame from bytes, verifying the checksum.
    ///
    /// Returns the frame and the number of bytes consumed. A buffer shorter than
    /// the declared length fails with `UnexpectedEof`; anything else that does
    /// not parse fails with `InvalidData`.
    pub fn deserialize(data: &[u8]) -> io::Result<(Self, usize)> {
        if data.len() < MIN_FRAME_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Frame too short",
            ));
        }

        let frame_length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;

        if frame_length < MIN_FRAME_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid frame length: {}", frame_length),
            ));
        }

        if data.len() < frame_length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "Frame truncated: expected {} bytes, got {}",
                    frame_length,
                    data.len()
                ),
            ));
        }

        let checksum_offset = frame_length - 4;
        let stored_checksum = u32::from_le_bytes([
            data[checksum_offset],
            data[checksum_offset + 1],
            data[checksum_offset + 2],
            data[checksum_offset + 3],
        ]);
        let computed_checksum = compute_checksum(&data[..checksum_offset]);

        if computed_checksum != stored_checksum {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Checksum mismatch: computed {:08x}, stored {:08x}",
                    computed_checksum, stored_checksum
                ),
            ));
        }

        let mut cursor = Cursor::new(&data[4..checksum_offset]);
        let invalid = |e: io::Error| io::Error::new(io::ErrorKind::InvalidData, e.to_string());

        let sequence = read_u64(&mut cursor).map_err(invalid)?;
        let op_count = read_u32(&mut cursor).map_err(invalid)? as usize;

        let mut ops = Vec::with_capacity(op_count.min(1024));
        for _ in 0..op_count {
            let mut tag = [0u8; 1];
            cursor.read_exact(&mut tag).map_err(invalid)?;
            let id = read_u64(&mut cursor).map_err(invalid)?;

            match tag[0] {
                TAG_PUT => {
                    let len = read_u32(&mut cursor).map_err(invalid)? as usize;
                    let mut value = vec![0u8; len];
                    cursor.read_exact(&mut value).map_err(invalid)?;
                    ops.push(FrameOp::Put { id, value });
                }
                TAG_DELETE => ops.push(FrameOp::Delete { id }),
                other => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("Unknown op tag: {}", other),
                    ))
                }
            }
        }

        if cursor.position() as usize != checksum_offset - 4 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Trailing bytes after last op",
            ));
        }

        Ok((Self { sequence, ops }, frame_length))
    }
}

fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}
