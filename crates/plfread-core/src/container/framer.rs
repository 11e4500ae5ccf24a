//! Block framing for the append-only container body.
//!
//! The framer walks the container from the end of the preamble, emitting a
//! lazy sequence of [`Frame`] values: data-carrying [`BlockRecord`]s and the
//! append-log [`LogMarker`]s that delimit sessions. Framing is strictly
//! positional: concatenating the byte ranges of every emitted frame
//! reproduces the post-preamble byte range exactly.
//!
//! ## Frame layout
//!
//! ```text
//! u32  payload length          (0xFFFF_FFFF = end-of-container sentinel)
//! u8   kind                    (0 schema, 1 data, other = opaque)
//! u8   flags                   (bit 0 compressed, bit 1 signed)
//! u16  reserved
//! u64  object id               (logical entity key)
//! u32  governing schema id     (0 = none)
//! [u8; 64]  signature          (present iff flags bit 1)
//! [u8; len] payload
//! ```
//!
//! Nine-byte markers `$$COMMIT$` and `##CLOSE##` take precedence over frame
//! interpretation at every boundary.

use crate::container::PREAMBLE_LEN;
use crate::cursor::ByteCursor;
use crate::error::{Error, Result};
use std::ops::Range;
use tracing::{debug, trace};

/// Byte sequence marking a committed append session
pub(crate) const COMMIT_MARKER: &[u8; 9] = b"$$COMMIT$";

/// Byte sequence marking a session closed without commit
pub(crate) const CLOSE_MARKER: &[u8; 9] = b"##CLOSE##";

/// Length-field value acting as the end-of-container sentinel
const END_SENTINEL: u32 = 0xFFFF_FFFF;

/// Fixed frame prelude: length, kind, flags, reserved, object id, schema id
const FRAME_PRELUDE_LEN: usize = 20;

/// Ed25519 signature length
const SIGNATURE_LEN: usize = 64;

/// Upper bound on a single payload; anything larger is corruption
const MAX_PAYLOAD_LEN: u32 = 256 * 1024 * 1024;

/// Append-log session boundary markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMarker {
    /// `$$COMMIT$`: the session's blocks become authoritative
    Commit,
    /// `##CLOSE##`: the session is abandoned without commit
    Close,
}

/// Block kind discriminator.
///
/// Unknown values are preserved rather than rejected so that newer minor
/// format variants still frame cleanly; the model builder skips them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Embedded XML metadata schema
    Schema,
    /// Raw data pages governed by a schema
    Data,
    /// Unrecognized kind, carried as opaque bytes
    Opaque(u8),
}

impl BlockKind {
    /// Parses a kind byte; unknown values become [`BlockKind::Opaque`].
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Schema,
            1 => Self::Data,
            other => Self::Opaque(other),
        }
    }
}

/// Raw frame flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockFlags(pub u8);

impl BlockFlags {
    /// Payload is a zlib stream.
    pub fn compressed(&self) -> bool {
        self.0 & 0x01 != 0
    }

    /// Frame carries an Ed25519 signature over the stored payload.
    pub fn signed(&self) -> bool {
        self.0 & 0x02 != 0
    }
}

/// One framed block, immutable once produced.
#[derive(Debug, Clone)]
pub struct BlockRecord {
    /// Position of this frame in framing order (markers are not counted)
    pub index: usize,
    /// Absolute byte offset of the frame start
    pub offset: usize,
    /// Total frame length in bytes, prelude and signature included
    pub frame_len: usize,
    /// Block kind discriminator
    pub kind: BlockKind,
    /// Raw frame flags
    pub flags: BlockFlags,
    /// Logical entity key
    pub object_id: u64,
    /// Governing schema id for data blocks; 0 = none
    pub schema_id: u32,
    /// Signature bytes, present iff the signed flag is set
    pub signature: Option<[u8; 64]>,
    /// Stored payload bytes (still compressed if the flag says so)
    pub payload: Vec<u8>,
}

impl BlockRecord {
    /// Byte range of the whole frame within the container.
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.frame_len
    }
}

/// One emitted frame: a block or a session marker.
#[derive(Debug, Clone)]
pub enum Frame {
    /// A data-carrying block
    Block(BlockRecord),
    /// A session boundary marker
    Marker {
        /// Which marker was found
        marker: LogMarker,
        /// Absolute byte offset of the marker
        offset: usize,
    },
}

impl Frame {
    /// Byte range of this frame within the container.
    pub fn range(&self) -> Range<usize> {
        match self {
            Frame::Block(block) => block.range(),
            Frame::Marker { offset, .. } => *offset..*offset + COMMIT_MARKER.len(),
        }
    }
}

/// Lazy, restartable iterator over the container's frames.
pub struct BlockFramer<'a> {
    data: &'a [u8],
    limit: usize,
    pos: usize,
    block_index: usize,
    done: bool,
}

impl<'a> BlockFramer<'a> {
    /// Creates a framer over `data`, scanning from the preamble end up to the
    /// header's declared data size.
    pub fn new(data: &'a [u8], declared_size: u32) -> Self {
        let limit = (declared_size as usize).min(data.len());
        Self {
            data,
            limit,
            pos: PREAMBLE_LEN,
            block_index: 0,
            done: false,
        }
    }

    /// Resets the framer to the first frame.
    pub fn rewind(&mut self) {
        self.pos = PREAMBLE_LEN;
        self.block_index = 0;
        self.done = false;
    }

    fn marker_at(&self, pos: usize) -> Option<LogMarker> {
        // Never consult bytes past the declared data size; trailing slack is
        // not part of the log.
        let candidate = self.data[..self.limit].get(pos..pos + COMMIT_MARKER.len())?;
        if candidate == COMMIT_MARKER {
            Some(LogMarker::Commit)
        } else if candidate == CLOSE_MARKER {
            Some(LogMarker::Close)
        } else {
            None
        }
    }

    fn read_block(&mut self) -> Result<BlockRecord> {
        let start = self.pos;
        let mut cursor = ByteCursor::at(&self.data[..self.limit], start);

        let payload_len = cursor.read_u32()?;
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(Error::malformed_block(
                start,
                format!("declared payload length {} is implausible", payload_len),
            ));
        }

        let kind = BlockKind::from_u8(cursor.read_u8()?);
        let flags = BlockFlags(cursor.read_u8()?);
        let _reserved = cursor.read_u16()?;
        let object_id = cursor.read_u64()?;
        let schema_id = cursor.read_u32()?;

        let sig_len = if flags.signed() { SIGNATURE_LEN } else { 0 };
        let frame_len = FRAME_PRELUDE_LEN + sig_len + payload_len as usize;
        if start + frame_len > self.limit {
            return Err(Error::malformed_block(
                start,
                format!(
                    "frame of {} bytes would read past the container end ({} of {} bytes used)",
                    frame_len, start, self.limit
                ),
            ));
        }

        let signature = if flags.signed() {
            let bytes = cursor.read_bytes(SIGNATURE_LEN)?;
            let mut sig = [0u8; 64];
            sig.copy_from_slice(bytes);
            Some(sig)
        } else {
            None
        };

        let payload = cursor.read_bytes(payload_len as usize)?.to_vec();

        let record = BlockRecord {
            index: self.block_index,
            offset: start,
            frame_len,
            kind,
            flags,
            object_id,
            schema_id,
            signature,
            payload,
        };

        trace!(
            index = record.index,
            offset = record.offset,
            len = record.frame_len,
            kind = ?record.kind,
            object_id = record.object_id,
            "framed block"
        );

        self.pos = start + frame_len;
        self.block_index += 1;
        Ok(record)
    }
}

impl Iterator for BlockFramer<'_> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.pos >= self.limit {
            return None;
        }

        if let Some(marker) = self.marker_at(self.pos) {
            let offset = self.pos;
            self.pos += COMMIT_MARKER.len();
            trace!(?marker, offset, "log marker");
            return Some(Ok(Frame::Marker { marker, offset }));
        }

        // Peek the length field for the end sentinel before committing to a
        // frame parse.
        if let Some(bytes) = self.data[..self.limit].get(self.pos..self.pos + 4) {
            let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            if len == END_SENTINEL {
                debug!(offset = self.pos, "end-of-container sentinel");
                self.done = true;
                return None;
            }
        }

        match self.read_block() {
            Ok(block) => Some(Ok(Frame::Block(block))),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
