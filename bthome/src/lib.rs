#![cfg_attr(all(not(feature = "std"), not(test)), no_std)]

//! BTHome v2 button beacon core.
//! Encodes resolved button events into the fixed BTHome object stream, seals it
//! with AES-128-CCM under a replay-protected nonce, and drives the short-lived
//! advertise window. Radio, input debouncing and entropy stay behind the traits
//! in [`backend`].

#[cfg(all(not(feature = "std"), feature = "alloc"))]
extern crate alloc;

mod aead;
pub mod adv;
pub mod backend;
#[cfg(any(feature = "std", feature = "alloc"))]
pub mod sim;

pub use aead::{Aead, CipherError, DummyAead};
#[cfg(feature = "crypto")]
pub use aead::CcmAead;
#[cfg(not(feature = "crypto"))]
pub use aead::DummyAead as DefaultAead;
#[cfg(feature = "crypto")]
pub use aead::CcmAead as DefaultAead;

use backend::EntropySource;

#[cfg(all(not(feature = "std"), feature = "alloc"))]
pub(crate) use alloc::vec::Vec;
#[cfg(feature = "std")]
pub(crate) use std::vec::Vec;

// BTHome device information, from https://bthome.io/format/
pub const SERVICE_UUID: u16 = 0xFCD2;
pub const ENCRYPTION_FLAG: u8 = 0x01;
pub const TRIGGER_BASED_FLAG: u8 = 0x04; // irregular advertising interval
pub const VERSION_2: u8 = 0x40;

// Object IDs used by this beacon.
pub const OBJ_PACKET_ID: u8 = 0x00;
pub const OBJ_BUTTON_EVENT: u8 = 0x3A;

pub const BUTTON_COUNT: usize = 4;
/// Packet-id object plus one button-event object per slot, two bytes each.
pub const ENCODED_LEN: usize = 2 * (BUTTON_COUNT + 1);
pub const KEY_LEN: usize = 16;
/// Reversed address (6) + service UUID (2) + device info (1) + counter (4).
pub const NONCE_LEN: usize = 13;
pub const TAG_LEN: usize = 4;
pub const COUNTER_LEN: usize = 4;

/// UUID (2) + device info (1) + ciphertext + counter + tag.
pub const SERVICE_DATA_MAX: usize = 3 + ENCODED_LEN + COUNTER_LEN + TAG_LEN;

/// Key used when no key is configured or the configured key fails to parse.
/// Matches the zero-initialised key the device ships with.
pub const DEFAULT_KEY: [u8; KEY_LEN] = [0; KEY_LEN];

/// Device-information byte: format version 2, trigger based, optional
/// encryption bit.
pub const fn device_info(encrypted: bool) -> u8 {
    if encrypted {
        VERSION_2 | TRIGGER_BASED_FLAG | ENCRYPTION_FLAG
    } else {
        VERSION_2 | TRIGGER_BASED_FLAG
    }
}

/// Resolved button event codes per the BTHome button object (0x3A).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum ButtonEvent {
    #[default]
    None = 0,
    Press = 1,
    DoublePress = 2,
    TriplePress = 3,
    LongPress = 4,
    LongDoublePress = 5,
    LongTriplePress = 6,
}

impl ButtonEvent {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Press),
            2 => Some(Self::DoublePress),
            3 => Some(Self::TriplePress),
            4 => Some(Self::LongPress),
            5 => Some(Self::LongDoublePress),
            6 => Some(Self::LongTriplePress),
            _ => None,
        }
    }
}

/// Current button-event table plus the mod-256 packet id.
///
/// `packet_id` bumps on every applied event so receivers can tell a repeated
/// value from a stale advertisement. It is never reset; button slots are
/// cleared when an advertise window closes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketState {
    pub packet_id: u8,
    pub buttons: [ButtonEvent; BUTTON_COUNT],
}

impl PacketState {
    pub const fn new() -> Self {
        Self {
            packet_id: 0,
            buttons: [ButtonEvent::None; BUTTON_COUNT],
        }
    }

    /// Record a resolved event for `slot`. Every call increments `packet_id`,
    /// even when the same slot/event pair repeats within one window: each
    /// resolved key event is a distinct occurrence on the air.
    ///
    /// `event` must not be `None`; out-of-range slots are ignored.
    pub fn apply_event(&mut self, slot: usize, event: ButtonEvent) {
        debug_assert!(slot < BUTTON_COUNT);
        debug_assert!(event != ButtonEvent::None);
        if slot >= BUTTON_COUNT || event == ButtonEvent::None {
            return;
        }
        self.buttons[slot] = event;
        self.packet_id = self.packet_id.wrapping_add(1);
    }

    /// Clear all button slots after a broadcast window. `packet_id` survives.
    pub fn clear_buttons(&mut self) {
        self.buttons = [ButtonEvent::None; BUTTON_COUNT];
    }

    pub fn is_clear(&self) -> bool {
        self.buttons.iter().all(|b| *b == ButtonEvent::None)
    }
}

impl Default for PacketState {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-layout BTHome object stream built from a [`PacketState`].
pub type EncodedFrame = [u8; ENCODED_LEN];

/// Build the object stream: packet id first, then one button object per slot.
/// Deterministic and fixed length so advertisement buffers can be sized at
/// compile time against the 31-byte legacy ceiling.
pub fn encode_frame(state: &PacketState) -> EncodedFrame {
    let mut out = [0u8; ENCODED_LEN];
    out[0] = OBJ_PACKET_ID;
    out[1] = state.packet_id;
    for (slot, event) in state.buttons.iter().enumerate() {
        out[2 + 2 * slot] = OBJ_BUTTON_EVENT;
        out[3 + 2 * slot] = event.code();
    }
    out
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Key string is not exactly 32 hex characters.
    KeyLength(usize),
    /// Key string contains a non-hex character.
    KeyNotHex,
}

/// Parse a 32-hex-char pre-shared key string.
pub fn parse_key(s: &str) -> Result<[u8; KEY_LEN], ConfigError> {
    if s.len() != KEY_LEN * 2 {
        return Err(ConfigError::KeyLength(s.len()));
    }
    let mut out = [0u8; KEY_LEN];
    for (i, chunk) in s.as_bytes().chunks_exact(2).enumerate() {
        let hi = hex_nibble(chunk[0]).ok_or(ConfigError::KeyNotHex)?;
        let lo = hex_nibble(chunk[1]).ok_or(ConfigError::KeyNotHex)?;
        out[i] = (hi << 4) | lo;
    }
    Ok(out)
}

fn hex_nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Pre-shared key, fixed nonce prefix and the monotonic replay counter.
///
/// The first nine nonce bytes are fixed for the device's lifetime; only the
/// trailing counter changes per seal. The counter is seeded from a CSPRNG so a
/// power cycle cannot revisit a previously used counter range under the same
/// key.
#[derive(Debug)]
pub struct NonceContext {
    key: [u8; KEY_LEN],
    prefix: [u8; NONCE_LEN - COUNTER_LEN],
    replay_counter: u32,
}

impl NonceContext {
    /// Build the context from the advertising address and an optional hex key
    /// string. A malformed key logs a warning and falls back to
    /// [`DEFAULT_KEY`] — the device must keep beaconing. A failed entropy read
    /// is fatal: sealing with a predictable counter risks nonce reuse.
    pub fn new<E: EntropySource>(
        address: [u8; 6],
        key_hex: Option<&str>,
        entropy: &mut E,
    ) -> Result<Self, E::Error> {
        let key = match key_hex {
            Some(s) => match parse_key(s) {
                Ok(key) => key,
                Err(err) => {
                    log::warn!("bad encryption key ({:?}), using default key", err);
                    DEFAULT_KEY
                }
            },
            None => DEFAULT_KEY,
        };

        let mut seed = [0u8; COUNTER_LEN];
        entropy.fill_bytes(&mut seed)?;

        // BTHome wants the BLE address in the opposite order.
        let mut prefix = [0u8; NONCE_LEN - COUNTER_LEN];
        for (i, b) in address.iter().rev().enumerate() {
            prefix[i] = *b;
        }
        prefix[6..8].copy_from_slice(&SERVICE_UUID.to_le_bytes());
        prefix[8] = device_info(true);

        Ok(Self {
            key,
            prefix,
            replay_counter: u32::from_le_bytes(seed),
        })
    }

    pub fn key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    pub fn replay_counter(&self) -> u32 {
        self.replay_counter
    }

    /// Fixed prefix followed by `counter` little-endian. Pure; the counter
    /// only advances in [`seal_frame`] on success.
    pub fn build_nonce(&self, counter: u32) -> [u8; NONCE_LEN] {
        let mut nonce = [0u8; NONCE_LEN];
        nonce[..NONCE_LEN - COUNTER_LEN].copy_from_slice(&self.prefix);
        nonce[NONCE_LEN - COUNTER_LEN..].copy_from_slice(&counter.to_le_bytes());
        nonce
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum SealError {
    /// The AEAD primitive failed; nothing may be transmitted this cycle and
    /// the replay counter did not advance.
    CipherFailure,
}

/// Ciphertext, tag and the counter value the receiver needs to rebuild the
/// nonce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SealedFrame {
    pub ciphertext: [u8; ENCODED_LEN],
    pub tag: [u8; TAG_LEN],
    pub replay_counter: u32,
}

/// Seal one frame under the context's current counter. The counter advances
/// by exactly 1 on success and not at all on failure, so a failed cycle
/// retries with a fresh build of the same nonce value and two transmitted
/// frames never share one.
pub fn seal_frame<A: Aead>(
    frame: &EncodedFrame,
    ctx: &mut NonceContext,
    aead: &A,
) -> Result<SealedFrame, SealError> {
    let counter = ctx.replay_counter;
    let nonce = ctx.build_nonce(counter);
    let (ciphertext, tag) = aead
        .seal(&ctx.key, &nonce, frame)
        .map_err(|_| SealError::CipherFailure)?;
    ctx.replay_counter = counter.wrapping_add(1);
    Ok(SealedFrame {
        ciphertext,
        tag,
        replay_counter: counter,
    })
}

/// Final service-data bytes for one advertisement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServiceData {
    buf: [u8; SERVICE_DATA_MAX],
    len: usize,
}

impl ServiceData {
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    fn header(encrypted: bool) -> Self {
        let mut buf = [0u8; SERVICE_DATA_MAX];
        buf[..2].copy_from_slice(&SERVICE_UUID.to_le_bytes());
        buf[2] = device_info(encrypted);
        Self { buf, len: 3 }
    }

    fn push(&mut self, bytes: &[u8]) {
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
    }
}

/// UUID | device info | plaintext object stream.
pub fn assemble_plain(frame: &EncodedFrame) -> ServiceData {
    let mut sd = ServiceData::header(false);
    sd.push(frame);
    sd
}

/// UUID | device info | ciphertext | replay counter (LE) | tag.
pub fn assemble_sealed(sealed: &SealedFrame) -> ServiceData {
    let mut sd = ServiceData::header(true);
    sd.push(&sealed.ciphertext);
    sd.push(&sealed.replay_counter.to_le_bytes());
    sd.push(&sealed.tag);
    sd
}
