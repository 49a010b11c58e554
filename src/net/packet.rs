//! Broadcast subcommand packets
//!
//! A frame is `header | subcommand type | size | body`. The size byte counts
//! the subcommand in 4-byte words; the header length field counts the whole
//! frame and is the only length this module trusts.

use crate::net::framing::{FrameBuilder, FrameReader};
use crate::net::subcmd::{SubcmdKind, Vocabulary, BROADCAST_PKT_TYPE};

/// Header layouts seen on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderFormat {
    /// `pkt_type: u8, flags: u8, pkt_len: u16`
    Short,
    /// `pkt_len: u16, pkt_type: u16, flags: u32`
    Wide,
}

impl HeaderFormat {
    pub const fn header_len(self) -> usize {
        match self {
            HeaderFormat::Short => 4,
            HeaderFormat::Wide => 8,
        }
    }

    const fn len_offset(self) -> usize {
        match self {
            HeaderFormat::Short => 2,
            HeaderFormat::Wide => 0,
        }
    }

    /// Offset of the subcommand type byte
    pub const fn type_offset(self) -> usize {
        self.header_len()
    }

    /// Smallest frame that still carries a subcommand type and size
    pub const fn min_frame_len(self) -> usize {
        self.header_len() + 2
    }

    /// Length field of a header. `header` must hold at least `header_len` bytes.
    pub fn declared_len(self, header: &[u8]) -> u16 {
        let at = self.len_offset();
        u16::from_le_bytes([header[at], header[at + 1]])
    }

    fn pkt_type(self, header: &[u8]) -> u16 {
        match self {
            HeaderFormat::Short => header[0] as u16,
            HeaderFormat::Wide => u16::from_le_bytes([header[2], header[3]]),
        }
    }

    fn flags(self, header: &[u8]) -> u32 {
        match self {
            HeaderFormat::Short => header[1] as u32,
            HeaderFormat::Wide => u32::from_le_bytes([header[4], header[5], header[6], header[7]]),
        }
    }

    /// Append a header in this layout
    ///
    /// The short layout keeps only the low byte of `pkt_type` and `flags`.
    pub(crate) fn write_header(self, out: &mut Vec<u8>, pkt_type: u16, flags: u32, len: u16) {
        match self {
            HeaderFormat::Short => {
                out.push(pkt_type.to_le_bytes()[0]);
                out.push(flags.to_le_bytes()[0]);
                out.extend_from_slice(&len.to_le_bytes());
            }
            HeaderFormat::Wide => {
                out.extend_from_slice(&len.to_le_bytes());
                out.extend_from_slice(&pkt_type.to_le_bytes());
                out.extend_from_slice(&flags.to_le_bytes());
            }
        }
    }

    /// Start a frame with a zero length field, to be patched by `finish`
    fn begin(self, pkt_type: u8) -> FrameBuilder {
        match self {
            HeaderFormat::Short => FrameBuilder::with_capacity(32)
                .write_u8(pkt_type)
                .write_u8(0)
                .write_u16(0),
            HeaderFormat::Wide => FrameBuilder::with_capacity(32)
                .write_u16(0)
                .write_u16(pkt_type as u16)
                .write_u32(0),
        }
    }

    fn finish(self, builder: FrameBuilder) -> Vec<u8> {
        let len = builder.len() as u16;
        builder.patch_u16(self.len_offset(), len).build()
    }
}

/// Packet parsing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    #[error("Frame too short: {len} bytes (min {min})")]
    TooShort { len: usize, min: usize },
    #[error("Frame truncated: declared {declared} bytes, got {actual}")]
    Truncated { declared: usize, actual: usize },
    #[error("Payload too short for {kind:?}")]
    PayloadTooShort { kind: SubcmdKind },
}

/// A validated broadcast subcommand frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubcmdPacket {
    format: HeaderFormat,
    frame: Vec<u8>,
}

impl SubcmdPacket {
    /// Take ownership of a frame, cutting it to its declared length
    pub fn from_frame(format: HeaderFormat, mut frame: Vec<u8>) -> Result<Self, PacketError> {
        let min = format.min_frame_len();
        if frame.len() < format.header_len() {
            return Err(PacketError::TooShort { len: frame.len(), min });
        }

        let declared = format.declared_len(&frame) as usize;
        if declared < min {
            return Err(PacketError::TooShort { len: declared, min });
        }
        if declared > frame.len() {
            return Err(PacketError::Truncated {
                declared,
                actual: frame.len(),
            });
        }

        frame.truncate(declared);
        Ok(Self { format, frame })
    }

    /// Copy a frame out of a larger buffer
    pub fn parse(format: HeaderFormat, bytes: &[u8]) -> Result<Self, PacketError> {
        Self::from_frame(format, bytes.to_vec())
    }

    pub(crate) fn from_parts(format: HeaderFormat, frame: Vec<u8>) -> Self {
        Self { format, frame }
    }

    pub fn format(&self) -> HeaderFormat {
        self.format
    }

    pub fn declared_len(&self) -> u16 {
        self.format.declared_len(&self.frame)
    }

    /// Outer packet type from the header
    pub fn pkt_type(&self) -> u16 {
        self.format.pkt_type(&self.frame)
    }

    /// Header flags, widened to the 8-byte layout's field
    pub fn flags(&self) -> u32 {
        self.format.flags(&self.frame)
    }

    /// Subcommand bytes: type, size and body
    pub fn subcommand(&self) -> &[u8] {
        &self.frame[self.format.type_offset()..]
    }

    pub fn is_broadcast(&self) -> bool {
        self.pkt_type() == BROADCAST_PKT_TYPE as u16
    }

    pub fn subcmd_type(&self) -> u8 {
        self.frame[self.format.type_offset()]
    }

    pub fn set_subcmd_type(&mut self, code: u8) {
        let at = self.format.type_offset();
        self.frame[at] = code;
    }

    /// Declared subcommand size in 4-byte words
    pub fn size_words(&self) -> u8 {
        self.frame[self.format.type_offset() + 1]
    }

    /// Bytes following the type and size bytes
    pub fn body(&self) -> &[u8] {
        &self.frame[self.format.min_frame_len()..]
    }

    pub fn kind(&self, vocabulary: Vocabulary) -> Option<SubcmdKind> {
        SubcmdKind::from_code(self.subcmd_type(), vocabulary)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.frame
    }
}

/// Rotation and coordinates of a lobby member
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }
}

/// Absolute position update
///
/// Body: `client_id: u8, unused: u8, unknown: u32, w, x, y, z: f32`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetPosition {
    pub client_id: u8,
    pub unknown: u32,
    pub position: Position,
}

impl SetPosition {
    const SIZE_WORDS: u8 = 6;

    pub fn decode(body: &[u8]) -> Option<Self> {
        let mut reader = FrameReader::new(body);
        let client_id = reader.read_u8()?;
        reader.skip(1)?;
        let unknown = reader.read_u32()?;
        let position = Position {
            w: reader.read_f32()?,
            x: reader.read_f32()?,
            y: reader.read_f32()?,
            z: reader.read_f32()?,
        };
        Some(Self {
            client_id,
            unknown,
            position,
        })
    }

    pub fn encode(&self, format: HeaderFormat, vocabulary: Vocabulary) -> SubcmdPacket {
        let builder = format
            .begin(BROADCAST_PKT_TYPE)
            .write_u8(SubcmdKind::SetPosition.code(vocabulary))
            .write_u8(Self::SIZE_WORDS)
            .write_u8(self.client_id)
            .write_u8(0)
            .write_u32(self.unknown)
            .write_f32(self.position.w)
            .write_f32(self.position.x)
            .write_f32(self.position.y)
            .write_f32(self.position.z);
        SubcmdPacket::from_parts(format, format.finish(builder))
    }
}

/// Incremental move, no rotation
///
/// Body: `client_id: u8, unused: u8, x, z: f32, unused: u32`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Move {
    pub client_id: u8,
    pub x: f32,
    pub z: f32,
}

impl Move {
    const SIZE_WORDS: u8 = 4;

    pub fn decode(body: &[u8]) -> Option<Self> {
        let mut reader = FrameReader::new(body);
        let client_id = reader.read_u8()?;
        reader.skip(1)?;
        let x = reader.read_f32()?;
        let z = reader.read_f32()?;
        Some(Self { client_id, x, z })
    }

    /// `kind` must be one of the two move kinds
    pub fn encode(&self, kind: SubcmdKind, format: HeaderFormat, vocabulary: Vocabulary) -> SubcmdPacket {
        let builder = format
            .begin(BROADCAST_PKT_TYPE)
            .write_u8(kind.code(vocabulary))
            .write_u8(Self::SIZE_WORDS)
            .write_u8(self.client_id)
            .write_u8(0)
            .write_f32(self.x)
            .write_f32(self.z)
            .write_u32(0);
        SubcmdPacket::from_parts(format, format.finish(builder))
    }
}

/// Typed view of the subcommands the relay interprets
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Subcommand {
    SetPosition(SetPosition),
    Move(SubcmdKind, Move),
    FinishLoad,
    /// Anything forwarded without interpretation
    Other(u8),
}

impl Subcommand {
    /// Decode a packet in the sender's vocabulary
    pub fn decode(packet: &SubcmdPacket, vocabulary: Vocabulary) -> Result<Self, PacketError> {
        match packet.kind(vocabulary) {
            Some(SubcmdKind::SetPosition) => SetPosition::decode(packet.body())
                .map(Subcommand::SetPosition)
                .ok_or(PacketError::PayloadTooShort {
                    kind: SubcmdKind::SetPosition,
                }),
            Some(kind) if kind.is_move() => Move::decode(packet.body())
                .map(|m| Subcommand::Move(kind, m))
                .ok_or(PacketError::PayloadTooShort { kind }),
            Some(SubcmdKind::FinishLoad) => Ok(Subcommand::FinishLoad),
            _ => Ok(Subcommand::Other(packet.subcmd_type())),
        }
    }
}
