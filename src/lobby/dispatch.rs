//! Inbound broadcast subcommand handling
//!
//! One inbound packet is handled entirely under its lobby's lock: the
//! position update and the fan-out that follows are atomic with respect to
//! every other packet from the same lobby.

use std::sync::Arc;
use tracing::{debug, trace};

use crate::lobby::broadcast::{BroadcastError, BroadcastReport, Delivery};
use crate::lobby::player::{ClientHandle, Guildcard};
use crate::lobby::room::{LobbyKind, LobbyState};
use crate::net::packet::{HeaderFormat, SubcmdPacket, Subcommand};

/// Dispatcher switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Also broadcast the original finish-load frame after the position
    /// unicasts in a default lobby. Peers then see the frame twice.
    pub broadcast_finish_load: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            broadcast_finish_load: true,
        }
    }
}

/// Everything that happened while handling one inbound packet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Sender's stored position was written
    pub position_updated: bool,
    /// Targeted position resends (finish-load in a default lobby)
    pub unicasts: Vec<Delivery>,
    /// Fan-out of the inbound frame, if one happened
    pub broadcast: Option<BroadcastReport>,
}

impl DispatchReport {
    /// `Ok` unless a unicast or broadcast recipient failed
    pub fn result(&self) -> Result<(), BroadcastError> {
        let unicasts = BroadcastReport {
            deliveries: self.unicasts.clone(),
        };
        unicasts.result()?;
        match &self.broadcast {
            Some(report) => report.result(),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("Client {0} points at a lobby that no longer holds it")]
    NotAMember(Guildcard),
    #[error("Frame layout {got:?} does not match client revision {expected:?}")]
    FormatMismatch {
        expected: HeaderFormat,
        got: HeaderFormat,
    },
}

/// Write an embedded position into the sender's slot
///
/// Only applies when the packet's client index is the sender's own slot.
/// Returns whether anything was written.
pub fn apply_move(state: &mut LobbyState, sender_slot: u8, subcommand: &Subcommand) -> bool {
    let Some(member) = state.member_mut(sender_slot) else {
        return false;
    };

    match subcommand {
        Subcommand::SetPosition(set) if set.client_id == sender_slot => {
            member.position = set.position;
            true
        }
        Subcommand::Move(_, mv) if mv.client_id == sender_slot => {
            member.position.x = mv.x;
            member.position.z = mv.z;
            true
        }
        Subcommand::SetPosition(_) | Subcommand::Move(..) => {
            debug!(
                "Client {} (slot {}) sent a position for another slot, not stored",
                member.client.guildcard(),
                sender_slot
            );
            false
        }
        _ => false,
    }
}

/// Routes inbound broadcast subcommands
#[derive(Debug, Default)]
pub struct Dispatcher {
    options: DispatchOptions,
}

impl Dispatcher {
    pub fn new(options: DispatchOptions) -> Self {
        Self { options }
    }

    /// Handle one broadcast subcommand from `sender`
    ///
    /// A sender outside any lobby is a no-op, whatever the frame.
    pub fn handle_inbound(
        &self,
        sender: &Arc<ClientHandle>,
        packet: &SubcmdPacket,
    ) -> Result<DispatchReport, DispatchError> {
        let Some(lobby) = sender.current_lobby() else {
            trace!("Client {} not in a lobby, ignoring subcommand", sender.guildcard());
            return Ok(DispatchReport::default());
        };

        let expected = sender.version().header_format();
        if packet.format() != expected {
            return Err(DispatchError::FormatMismatch {
                expected,
                got: packet.format(),
            });
        }

        let mut state = lobby.lock();
        let slot = state
            .slot_of(sender)
            .ok_or(DispatchError::NotAMember(sender.guildcard()))?;

        let mut report = DispatchReport::default();

        match Subcommand::decode(packet, sender.version().vocabulary()) {
            Ok(sub @ (Subcommand::SetPosition(_) | Subcommand::Move(..))) => {
                report.position_updated = apply_move(&mut state, slot, &sub);
            }
            Ok(Subcommand::FinishLoad) if lobby.kind() == LobbyKind::Default => {
                report.unicasts = state.send_position_to_all(slot);
                if !self.options.broadcast_finish_load {
                    return Ok(report);
                }
            }
            Ok(Subcommand::Other(code)) => {
                trace!("Unhandled subcommand 0x{:02X} from {}, forwarding", code, sender.guildcard());
            }
            Ok(Subcommand::FinishLoad) => {}
            Err(e) => {
                debug!("{} from {}, forwarding without update", e, sender.guildcard());
            }
        }

        report.broadcast = Some(state.broadcast(sender, packet, false));
        Ok(report)
    }
}
