//! Lobby fan-out
//!
//! Delivery is best effort: every eligible member is attempted and the
//! outcome for each one is recorded.

use tracing::{debug, trace, warn};

use crate::lobby::player::{ClientHandle, Guildcard};
use crate::lobby::room::{Lobby, LobbyState, Member};
use crate::net::packet::{SetPosition, SubcmdPacket};
use crate::net::subcmd::ClientVersion;
use crate::net::translate::{translate_for, TranslateError};
use crate::net::transport::SendError;

/// Why a delivery attempt failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("send failed: {0}")]
    Send(#[from] SendError),
    #[error("translation failed: {0}")]
    Translate(TranslateError),
}

/// What happened for one recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Original frame sent unchanged
    Forwarded,
    /// Translated copy sent
    Translated,
    /// Recipient ignores the sender
    Ignored,
    /// No counterpart in the recipient's revision
    Dropped,
    Failed(DeliveryError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub slot: u8,
    pub guildcard: Guildcard,
    pub outcome: DeliveryOutcome,
}

impl Delivery {
    pub fn is_sent(&self) -> bool {
        matches!(
            self.outcome,
            DeliveryOutcome::Forwarded | DeliveryOutcome::Translated
        )
    }
}

/// Per-recipient outcomes of one broadcast, in slot order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub deliveries: Vec<Delivery>,
}

impl BroadcastReport {
    /// Slots that were handed a frame
    pub fn sent_slots(&self) -> Vec<u8> {
        self.deliveries
            .iter()
            .filter(|d| d.is_sent())
            .map(|d| d.slot)
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &Delivery> {
        self.deliveries
            .iter()
            .filter(|d| matches!(d.outcome, DeliveryOutcome::Failed(_)))
    }

    /// `Ok` unless some recipient failed; reports the first failure
    pub fn result(&self) -> Result<(), BroadcastError> {
        let failed = self.failures().count();
        match self.failures().next() {
            Some(Delivery {
                slot,
                outcome: DeliveryOutcome::Failed(error),
                ..
            }) => Err(BroadcastError {
                slot: *slot,
                failed,
                error: error.clone(),
            }),
            _ => Ok(()),
        }
    }
}

/// At least one recipient could not be served
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{failed} recipient(s) failed, first at slot {slot}: {error}")]
pub struct BroadcastError {
    pub slot: u8,
    pub failed: usize,
    pub error: DeliveryError,
}

/// Send `packet` from a client of revision `from` to one member
fn deliver(from: ClientVersion, slot: u8, member: &Member, packet: &SubcmdPacket) -> Delivery {
    let recipient = &member.client;
    let outcome = if recipient.version() == from {
        match recipient.send(packet.as_bytes()) {
            Ok(()) => DeliveryOutcome::Forwarded,
            Err(e) => DeliveryOutcome::Failed(e.into()),
        }
    } else {
        translate_and_send(from, recipient, packet)
    };

    if let DeliveryOutcome::Failed(e) = &outcome {
        warn!("Delivery to {} (slot {}) failed: {}", recipient.guildcard(), slot, e);
    }

    Delivery {
        slot,
        guildcard: recipient.guildcard(),
        outcome,
    }
}

fn translate_and_send(
    from: ClientVersion,
    recipient: &ClientHandle,
    packet: &SubcmdPacket,
) -> DeliveryOutcome {
    // The translated frame is dropped once the send attempt returns.
    match translate_for(packet, from, recipient.version()) {
        Ok(translated) => match recipient.send(translated.as_bytes()) {
            Ok(()) => DeliveryOutcome::Translated,
            Err(e) => DeliveryOutcome::Failed(e.into()),
        },
        Err(TranslateError::Dropped { code, .. }) => {
            trace!(
                "No {:?} counterpart for 0x{:02X} from {:?}, dropping",
                recipient.version(),
                code,
                from
            );
            DeliveryOutcome::Dropped
        }
        Err(e) => DeliveryOutcome::Failed(DeliveryError::Translate(e)),
    }
}

impl LobbyState {
    /// Fan `packet` out to every member except `sender`
    ///
    /// The caller holds the lobby lock. With `ignore_check`, members that
    /// ignore the sender are skipped before any translation is attempted.
    pub fn broadcast(
        &self,
        sender: &ClientHandle,
        packet: &SubcmdPacket,
        ignore_check: bool,
    ) -> BroadcastReport {
        let from = sender.version();
        let deliveries = self
            .members()
            .filter(|(_, member)| !std::ptr::eq(member.client.as_ref(), sender))
            .map(|(slot, member)| {
                if ignore_check && member.client.has_ignored(sender.guildcard()) {
                    return Delivery {
                        slot,
                        guildcard: member.client.guildcard(),
                        outcome: DeliveryOutcome::Ignored,
                    };
                }
                deliver(from, slot, member, packet)
            })
            .collect();

        BroadcastReport { deliveries }
    }

    /// Unicast the position of the member in `from_slot` to one other member
    ///
    /// The frame is built in the recipient's own header layout and numbering.
    pub fn send_position(&self, from_slot: u8, to_slot: u8) -> Option<Delivery> {
        let source = self.member(from_slot)?;
        let target = self.member(to_slot)?;
        let version = target.client.version();

        let packet = SetPosition {
            client_id: from_slot,
            unknown: 0,
            position: source.position,
        }
        .encode(version.header_format(), version.vocabulary());

        // Already in the recipient's revision, so it is forwarded as is.
        Some(deliver(version, to_slot, target, &packet))
    }

    /// Unicast the position of `from_slot` to every other member
    pub fn send_position_to_all(&self, from_slot: u8) -> Vec<Delivery> {
        self.members()
            .filter(|(slot, _)| *slot != from_slot)
            .filter_map(|(to_slot, _)| self.send_position(from_slot, to_slot))
            .collect()
    }
}

impl Lobby {
    /// Lock the lobby and fan `packet` out from `sender`
    pub fn broadcast(
        &self,
        sender: &ClientHandle,
        packet: &SubcmdPacket,
        ignore_check: bool,
    ) -> BroadcastReport {
        let state = self.lock();
        let report = state.broadcast(sender, packet, ignore_check);
        debug!(
            "Broadcast 0x{:02X} from {} in lobby {}: {} of {} sent",
            packet.subcmd_type(),
            sender.guildcard(),
            self.id(),
            report.sent_slots().len(),
            report.deliveries.len()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lobby::room::LobbyKind;
    use crate::lobby::testing::{client, RecordingTransport};
    use crate::net::packet::{HeaderFormat, Move, Position};
    use crate::net::subcmd::{SubcmdKind, Vocabulary};
    use std::sync::Arc;

    fn lobby_with(versions: &[ClientVersion]) -> (Arc<Lobby>, Vec<(Arc<ClientHandle>, Arc<RecordingTransport>)>) {
        let lobby = Lobby::new(LobbyKind::Default, 4);
        let clients: Vec<_> = versions
            .iter()
            .enumerate()
            .map(|(i, v)| client(100 + i as u32, *v))
            .collect();
        for (c, _) in &clients {
            lobby.add_client(c).unwrap();
        }
        (lobby, clients)
    }

    fn trial_move() -> SubcmdPacket {
        Move {
            client_id: 0,
            x: 1.0,
            z: 2.0,
        }
        .encode(SubcmdKind::MoveFast, HeaderFormat::Short, Vocabulary::Trial)
    }

    #[test]
    fn test_never_sends_to_sender() {
        use ClientVersion::*;
        let (lobby, clients) = lobby_with(&[Trial, Trial, Trial]);

        let report = lobby.broadcast(&clients[0].0, &trial_move(), false);

        assert!(clients[0].1.frames().is_empty());
        assert_eq!(report.sent_slots(), vec![1, 2]);
        assert!(report.result().is_ok());
    }

    #[test]
    fn test_same_revision_forwards_original() {
        use ClientVersion::*;
        let (lobby, clients) = lobby_with(&[Trial, Trial]);
        let packet = trial_move();

        lobby.broadcast(&clients[0].0, &packet, false);

        assert_eq!(clients[1].1.frames(), vec![packet.as_bytes().to_vec()]);
    }

    #[test]
    fn test_current_recipient_gets_translation() {
        use ClientVersion::*;
        let (lobby, clients) = lobby_with(&[Trial, Current]);
        let packet = trial_move();

        let report = lobby.broadcast(&clients[0].0, &packet, false);

        let frames = clients[1].1.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0][HeaderFormat::Short.type_offset()], 0x42);
        assert_eq!(frames[0].len(), packet.as_bytes().len());
        assert_eq!(report.deliveries[0].outcome, DeliveryOutcome::Translated);
    }

    #[test]
    fn test_untranslatable_is_dropped_silently() {
        use ClientVersion::*;
        let (lobby, clients) = lobby_with(&[Trial, Current, Trial]);
        let packet = SubcmdPacket::from_frame(HeaderFormat::Short, vec![0x60, 0, 8, 0, 0x7F, 1, 0, 0]).unwrap();

        let report = lobby.broadcast(&clients[0].0, &packet, false);

        assert!(clients[1].1.frames().is_empty());
        assert_eq!(clients[2].1.frames(), vec![packet.as_bytes().to_vec()]);
        assert_eq!(report.deliveries[0].outcome, DeliveryOutcome::Dropped);
        assert!(report.result().is_ok());
    }

    #[test]
    fn test_ignore_filter() {
        use ClientVersion::*;
        let (lobby, clients) = lobby_with(&[Trial, Trial, Current]);
        clients[1].0.ignore(clients[0].0.guildcard());
        clients[2].0.ignore(clients[0].0.guildcard());

        let report = lobby.broadcast(&clients[0].0, &trial_move(), true);

        assert!(clients[1].1.frames().is_empty());
        assert!(clients[2].1.frames().is_empty());
        assert!(report
            .deliveries
            .iter()
            .all(|d| d.outcome == DeliveryOutcome::Ignored));
    }

    #[test]
    fn test_ignore_list_unused_without_filter() {
        use ClientVersion::*;
        let (lobby, clients) = lobby_with(&[Trial, Trial]);
        clients[1].0.ignore(clients[0].0.guildcard());

        lobby.broadcast(&clients[0].0, &trial_move(), false);

        assert_eq!(clients[1].1.frames().len(), 1);
    }

    #[test]
    fn test_failure_does_not_stop_fanout() {
        use ClientVersion::*;
        let (lobby, clients) = lobby_with(&[Trial, Trial, Current, Trial]);
        clients[1].1.fail();

        let report = lobby.broadcast(&clients[0].0, &trial_move(), false);

        assert_eq!(report.sent_slots(), vec![2, 3]);
        assert_eq!(clients[2].1.frames().len(), 1);
        assert_eq!(clients[3].1.frames().len(), 1);

        let err = report.result().unwrap_err();
        assert_eq!(err.slot, 1);
        assert_eq!(err.failed, 1);
        assert_eq!(err.error, DeliveryError::Send(SendError::Closed));
    }

    #[test]
    fn test_binary_sender_reaches_every_revision() {
        use ClientVersion::*;
        let (lobby, clients) = lobby_with(&[Binary, Trial, Current]);
        let packet = Move {
            client_id: 0,
            x: 3.0,
            z: 4.0,
        }
        .encode(SubcmdKind::MoveSlow, HeaderFormat::Wide, Vocabulary::Current);

        let report = lobby.broadcast(&clients[0].0, &packet, false);

        assert_eq!(report.sent_slots(), vec![1, 2]);
        let trial = SubcmdPacket::parse(HeaderFormat::Short, &clients[1].1.frames()[0]).unwrap();
        assert_eq!(trial.subcmd_type(), 0x37);
        assert_eq!(trial.body(), packet.body());
        let current = SubcmdPacket::parse(HeaderFormat::Short, &clients[2].1.frames()[0]).unwrap();
        assert_eq!(current.subcmd_type(), 0x40);
        assert_eq!(current.body(), packet.body());
    }

    #[test]
    fn test_short_header_senders_reach_binary() {
        use ClientVersion::*;
        let (lobby, clients) = lobby_with(&[Trial, Current, Binary]);
        let trial_packet = trial_move();

        let report = lobby.broadcast(&clients[0].0, &trial_packet, false);

        let outcomes: Vec<_> = report.deliveries.iter().map(|d| (d.slot, d.outcome.clone())).collect();
        assert_eq!(
            outcomes,
            vec![(1, DeliveryOutcome::Translated), (2, DeliveryOutcome::Translated)]
        );
        let wide = SubcmdPacket::parse(HeaderFormat::Wide, &clients[2].1.frames()[0]).unwrap();
        assert_eq!(wide.subcmd_type(), 0x42);
        assert_eq!(wide.declared_len() as usize, trial_packet.as_bytes().len() + 4);
        assert_eq!(wide.body(), trial_packet.body());

        let current_packet = Move {
            client_id: 1,
            x: 1.0,
            z: 2.0,
        }
        .encode(SubcmdKind::MoveFast, HeaderFormat::Short, Vocabulary::Current);

        let report = lobby.broadcast(&clients[1].0, &current_packet, false);

        assert_eq!(report.sent_slots(), vec![0, 2]);
        let wide = SubcmdPacket::parse(HeaderFormat::Wide, &clients[2].1.frames()[1]).unwrap();
        assert_eq!(wide.subcmd_type(), 0x42);
        assert_eq!(wide.body(), current_packet.body());
    }

    #[test]
    fn test_send_position_uses_recipient_revision() {
        use ClientVersion::*;
        let (lobby, clients) = lobby_with(&[Trial, Current, Binary]);
        {
            let mut state = lobby.lock();
            state.member_mut(0).unwrap().position = Position::new(0.25, 1.0, 2.0, 3.0);
        }

        let deliveries = lobby.lock().send_position_to_all(0);

        assert_eq!(deliveries.len(), 2);
        let current = SubcmdPacket::parse(HeaderFormat::Short, &clients[1].1.frames()[0]).unwrap();
        assert_eq!(current.subcmd_type(), 0x3F);
        let wide = SubcmdPacket::parse(HeaderFormat::Wide, &clients[2].1.frames()[0]).unwrap();
        assert_eq!(wide.subcmd_type(), 0x3F);
        let decoded = SetPosition::decode(wide.body()).unwrap();
        assert_eq!(decoded.client_id, 0);
        assert_eq!(decoded.position, Position::new(0.25, 1.0, 2.0, 3.0));
    }
}
