//! Cross-revision packet translation
//!
//! Translation copies a frame byte for byte and rewrites only the subcommand
//! type. Payload layouts of the mapped kinds are identical across revisions,
//! so nothing past the type byte is touched. Between header layouts the
//! header is re-encoded around the unchanged subcommand bytes.

use tracing::trace;

use crate::net::packet::{HeaderFormat, SubcmdPacket};
use crate::net::subcmd::{map_code, ClientVersion, Vocabulary};

/// Translation direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    CurrentToTrial,
    TrialToCurrent,
    /// Binary-family frames use the current numbering
    BinaryToTrial,
}

impl Direction {
    /// Code mapping needed to deliver a sender's frame to a recipient
    ///
    /// `None` when both revisions share a numbering.
    pub fn between(sender: ClientVersion, recipient: ClientVersion) -> Option<Self> {
        match (sender, recipient) {
            (ClientVersion::Trial, ClientVersion::Current | ClientVersion::Binary) => {
                Some(Direction::TrialToCurrent)
            }
            (ClientVersion::Current, ClientVersion::Trial) => Some(Direction::CurrentToTrial),
            (ClientVersion::Binary, ClientVersion::Trial) => Some(Direction::BinaryToTrial),
            _ => None,
        }
    }

    fn vocabularies(self) -> (Vocabulary, Vocabulary) {
        match self {
            Direction::CurrentToTrial | Direction::BinaryToTrial => {
                (Vocabulary::Current, Vocabulary::Trial)
            }
            Direction::TrialToCurrent => (Vocabulary::Trial, Vocabulary::Current),
        }
    }
}

/// Translation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranslateError {
    /// No counterpart in the target vocabulary; the recipient is skipped
    #[error("Subcommand 0x{code:02X} has no {direction:?} mapping")]
    Dropped { code: u8, direction: Direction },
    #[error("Failed to allocate {len} bytes for translated frame")]
    AllocationFailure { len: usize },
    #[error("Translated frame of {len} bytes exceeds the length field")]
    FrameTooLarge { len: usize },
}

fn mapped_code(code: u8, direction: Direction) -> Result<u8, TranslateError> {
    let (from, to) = direction.vocabularies();
    map_code(code, from, to).ok_or_else(|| {
        trace!(
            "Cannot translate subcommand 0x{:02X} ({:?}), dropping",
            code,
            direction
        );
        TranslateError::Dropped { code, direction }
    })
}

/// Copy `packet` into `format`, giving the copy subcommand type `code`
fn rebuild(packet: &SubcmdPacket, format: HeaderFormat, code: u8) -> Result<SubcmdPacket, TranslateError> {
    let subcommand = packet.subcommand();
    let len = format.header_len() + subcommand.len();
    let declared = u16::try_from(len).map_err(|_| TranslateError::FrameTooLarge { len })?;

    let mut frame = Vec::new();
    frame
        .try_reserve_exact(len)
        .map_err(|_| TranslateError::AllocationFailure { len })?;
    format.write_header(&mut frame, packet.pkt_type(), packet.flags(), declared);
    frame.extend_from_slice(subcommand);

    let mut translated = SubcmdPacket::from_parts(format, frame);
    translated.set_subcmd_type(code);
    Ok(translated)
}

/// Produce a copy of `packet` with its type rewritten for `direction`
///
/// The header layout is kept as is.
pub fn translate(packet: &SubcmdPacket, direction: Direction) -> Result<SubcmdPacket, TranslateError> {
    let code = mapped_code(packet.subcmd_type(), direction)?;
    rebuild(packet, packet.format(), code)
}

/// Produce a copy of a `sender` frame readable by a `recipient` client
///
/// The type code is mapped when the numberings differ and the header is
/// re-encoded when the layouts differ.
pub fn translate_for(
    packet: &SubcmdPacket,
    sender: ClientVersion,
    recipient: ClientVersion,
) -> Result<SubcmdPacket, TranslateError> {
    let code = match Direction::between(sender, recipient) {
        Some(direction) => mapped_code(packet.subcmd_type(), direction)?,
        None => packet.subcmd_type(),
    };
    rebuild(packet, recipient.header_format(), code)
}
