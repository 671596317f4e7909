//! Advertisement lifecycle: when to encode, seal, broadcast and clear.
//!
//! One logical owner drives everything: button events are queued by the input
//! side and consumed here, on `tick`, by the single execution context that is
//! also allowed to touch the replay counter. That serialisation is what makes
//! "two concurrent seals with one counter value" impossible by construction.

use core::fmt;
use core::time::Duration;

use heapless::Deque;

use crate::backend::RadioBackend;
use crate::{
    assemble_plain, assemble_sealed, encode_frame, seal_frame, Aead, ButtonEvent, DummyAead,
    NonceContext, PacketState, ServiceData,
};

/// Legacy advertisement ceiling.
pub const ADV_MAX: usize = 31;

const AD_TYPE_FLAGS: u8 = 0x01;
const AD_TYPE_NAME_COMPLETE: u8 = 0x09;
const AD_TYPE_SVC_DATA16: u8 = 0x16;
const FLAGS_GENERAL_NO_BREDR: u8 = 0x06;

/// Pending events the input side may queue while a broadcast is in flight.
pub const EVENT_QUEUE_DEPTH: usize = 8;

/// Complete AD set handed to the radio.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdvFrame {
    buf: [u8; ADV_MAX],
    len: usize,
}

impl AdvFrame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

/// Flags element, optional complete local name, then the 16-bit service data
/// element. The name is dropped (not truncated) when it would overflow the
/// 31-byte ceiling; encrypted payloads never have room for it.
pub fn build_adv(service_data: &ServiceData, name: Option<&str>) -> AdvFrame {
    let mut frame = AdvFrame {
        buf: [0u8; ADV_MAX],
        len: 0,
    };
    push_element(&mut frame, AD_TYPE_FLAGS, &[FLAGS_GENERAL_NO_BREDR]);

    let sd = service_data.as_bytes();
    if let Some(name) = name {
        let needed = frame.len + 2 + name.len() + 2 + sd.len();
        if needed <= ADV_MAX {
            push_element(&mut frame, AD_TYPE_NAME_COMPLETE, name.as_bytes());
        } else {
            log::debug!("device name does not fit in advertisement, dropping it");
        }
    }
    push_element(&mut frame, AD_TYPE_SVC_DATA16, sd);
    frame
}

fn push_element(frame: &mut AdvFrame, ad_type: u8, data: &[u8]) {
    frame.buf[frame.len] = 1 + data.len() as u8;
    frame.buf[frame.len + 1] = ad_type;
    frame.buf[frame.len + 2..frame.len + 2 + data.len()].copy_from_slice(data);
    frame.len += 2 + data.len();
}

#[derive(Clone, Copy, Debug)]
pub struct AdvConfig {
    /// How long one payload stays on the air before the state clears.
    pub dwell: Duration,
    /// Advisory advertising interval passed to the radio.
    pub interval_hint: Duration,
    /// Complete local name for unencrypted advertisements.
    pub device_name: Option<&'static str>,
}

impl Default for AdvConfig {
    fn default() -> Self {
        Self {
            dwell: Duration::from_millis(500),
            interval_hint: Duration::from_millis(100),
            device_name: Some("BTHomeBtn"),
        }
    }
}

/// Observable lifecycle phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Dirty,
    Advertising,
}

#[derive(Clone, Copy)]
enum State {
    Idle,
    Dirty,
    Advertising { since_ms: u64 },
}

/// The advertisement lifecycle state machine.
///
/// Idle -> Dirty on a queued event; Dirty -> Advertising on the next tick
/// (encode, seal, assemble, radio start); Advertising -> Idle once the dwell
/// window elapses (radio stop, button slots cleared, packet id kept). Events
/// arriving while a broadcast is in flight stay queued and open the next
/// window — coalescing trades a little latency for battery.
pub struct AdvMachine<R: RadioBackend, A: Aead = DummyAead> {
    radio: R,
    config: AdvConfig,
    packet: PacketState,
    crypto: Option<(NonceContext, A)>,
    pending: Deque<(u8, ButtonEvent), EVENT_QUEUE_DEPTH>,
    state: State,
}

impl<R> AdvMachine<R, DummyAead>
where
    R: RadioBackend,
    R::Error: fmt::Debug,
{
    /// Plaintext beacon; the sealing pipeline is bypassed entirely.
    pub fn plaintext(radio: R, config: AdvConfig) -> Self {
        Self {
            radio,
            config,
            packet: PacketState::new(),
            crypto: None,
            pending: Deque::new(),
            state: State::Idle,
        }
    }
}

impl<R, A> AdvMachine<R, A>
where
    R: RadioBackend,
    R::Error: fmt::Debug,
    A: Aead,
{
    /// Authenticated-encrypted beacon.
    pub fn encrypted(radio: R, config: AdvConfig, ctx: NonceContext, aead: A) -> Self {
        Self {
            radio,
            config,
            packet: PacketState::new(),
            crypto: Some((ctx, aead)),
            pending: Deque::new(),
            state: State::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            State::Idle => Phase::Idle,
            State::Dirty => Phase::Dirty,
            State::Advertising { .. } => Phase::Advertising,
        }
    }

    pub fn packet_id(&self) -> u8 {
        self.packet.packet_id
    }

    /// Current replay counter, if this beacon seals its payloads.
    pub fn replay_counter(&self) -> Option<u32> {
        self.crypto.as_ref().map(|(ctx, _)| ctx.replay_counter())
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// Queue a resolved event from the input side. This is the only producer
    /// path; the queue bounds how far input may run ahead of the broadcast
    /// loop. Returns `false` when the event was dropped (queue full or a
    /// `None` event).
    pub fn offer_event(&mut self, slot: u8, event: ButtonEvent) -> bool {
        if event == ButtonEvent::None || slot as usize >= crate::BUTTON_COUNT {
            return false;
        }
        if self.pending.push_back((slot, event)).is_err() {
            log::warn!("event queue full, dropping slot {} event", slot);
            return false;
        }
        true
    }

    /// Radio confirmation that the configured number of advertisement events
    /// went out; closes the window without waiting for the dwell timer.
    pub fn on_adv_complete(&mut self) {
        if matches!(self.state, State::Advertising { .. }) {
            self.close_window();
        }
    }

    /// Advance the machine. `now_ms` is monotonic milliseconds; the caller's
    /// tick rate bounds how quickly a dirty window turns into a broadcast.
    pub fn tick(&mut self, now_ms: u64) {
        if let State::Advertising { since_ms } = self.state {
            if now_ms.wrapping_sub(since_ms) < self.config.dwell.as_millis() as u64 {
                // Window still open; queued events wait for the next one.
                return;
            }
            self.close_window();
        }

        while let Some((slot, event)) = self.pending.pop_front() {
            self.packet.apply_event(slot as usize, event);
            self.state = State::Dirty;
        }

        if matches!(self.state, State::Dirty) {
            if self.broadcast() {
                self.state = State::Advertising { since_ms: now_ms };
            }
            // On a seal failure we stay Dirty and retry next tick; nothing
            // was transmitted and the counter did not move.
        }
    }

    fn close_window(&mut self) {
        if let Err(err) = self.radio.stop() {
            // The radio owns its retry policy; transition anyway so the
            // machine cannot wedge in Advertising.
            log::warn!("radio stop failed: {:?}", err);
        }
        self.packet.clear_buttons();
        self.state = State::Idle;
    }

    /// Encode, seal (at most once per cycle) and hand the AD set to the
    /// radio. Returns `false` only when sealing failed.
    fn broadcast(&mut self) -> bool {
        let frame = encode_frame(&self.packet);
        let service_data = match &mut self.crypto {
            Some((ctx, aead)) => match seal_frame(&frame, ctx, aead) {
                Ok(sealed) => assemble_sealed(&sealed),
                Err(err) => {
                    log::warn!("seal failed ({:?}), retrying next tick", err);
                    return false;
                }
            },
            None => assemble_plain(&frame),
        };

        let name = if self.crypto.is_none() {
            self.config.device_name
        } else {
            // Encrypted service data leaves no room for the name.
            None
        };
        let adv = build_adv(&service_data, name);
        if let Err(err) = self.radio.start(adv.as_bytes(), self.config.interval_hint) {
            log::warn!("radio start failed: {:?}", err);
        }
        true
    }
}
