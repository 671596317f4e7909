use bthome::adv::{AdvConfig, AdvMachine, Phase};
use bthome::sim::{FixedEntropy, MockRadio};
use bthome::{ButtonEvent, CcmAead, NonceContext};

const ADDRESS: [u8; 6] = [0xA1, 0xB2, 0xC3, 0xD4, 0xE5, 0xF6];
const KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f";

fn encrypted_machine() -> AdvMachine<MockRadio, CcmAead> {
    // Counter seeds at 0x1000.
    let mut entropy = FixedEntropy::new([0x00, 0x10, 0x00, 0x00]);
    let ctx = NonceContext::new(ADDRESS, Some(KEY_HEX), &mut entropy).expect("seed");
    AdvMachine::encrypted(MockRadio::new(), AdvConfig::default(), ctx, CcmAead)
}

#[test]
fn plaintext_press_to_beacon_and_back_to_idle() {
    let mut machine = AdvMachine::plaintext(MockRadio::new(), AdvConfig::default());
    assert_eq!(machine.phase(), Phase::Idle);

    assert!(machine.offer_event(0, ButtonEvent::Press));
    machine.tick(0);
    assert_eq!(machine.phase(), Phase::Advertising);

    let expected: &[u8] = &[
        0x02, 0x01, 0x06, // flags
        0x0A, 0x09, b'B', b'T', b'H', b'o', b'm', b'e', b'B', b't', b'n', // name
        0x0E, 0x16, // service data element
        0xD2, 0xFC, 0x44, // UUID + device info (unencrypted)
        0x00, 1, 0x3A, 1, 0x3A, 0, 0x3A, 0, 0x3A, 0, // object stream
    ];
    assert_eq!(machine.radio().last_payload(), Some(expected));

    // Mid-window tick changes nothing.
    machine.tick(250);
    assert_eq!(machine.radio().stats().starts, 1);

    // Dwell elapses: stop, clear buttons, keep packet id.
    machine.tick(500);
    assert_eq!(machine.phase(), Phase::Idle);
    assert_eq!(machine.radio().stats().stops, 1);
    assert!(!machine.radio().stats().active);
    assert_eq!(machine.packet_id(), 1);
}

#[test]
fn encrypted_press_matches_golden_vector() {
    let mut machine = encrypted_machine();
    assert_eq!(machine.replay_counter(), Some(0x1000));

    machine.offer_event(0, ButtonEvent::Press);
    machine.tick(0);

    // AES-128-CCM over [0x00,1,0x3A,1,0x3A,0,0x3A,0,0x3A,0] with nonce
    // f6e5d4c3b2a1 d2fc 45 00100000, cross-checked against an independent
    // CCM implementation.
    let expected: &[u8] = &[
        0x02, 0x01, 0x06, // flags, no room for a name
        0x16, 0x16, // service data element, 21 payload bytes
        0xD2, 0xFC, 0x45, // UUID + device info (encrypted)
        0x68, 0xA8, 0xB1, 0xC0, 0x29, 0xA7, 0x54, 0x6E, 0xD2, 0x6D, // ciphertext
        0x00, 0x10, 0x00, 0x00, // replay counter little-endian
        0xDF, 0xF0, 0x49, 0x55, // tag
    ];
    assert_eq!(machine.radio().last_payload(), Some(expected));
    assert_eq!(machine.replay_counter(), Some(0x1001));
}

#[test]
fn second_window_uses_next_counter_and_fresh_state() {
    let mut machine = encrypted_machine();
    machine.offer_event(0, ButtonEvent::Press);
    machine.tick(0);
    machine.tick(500); // close the first window

    assert_eq!(machine.phase(), Phase::Idle);
    assert_eq!(machine.packet_id(), 1);

    machine.offer_event(1, ButtonEvent::LongPress);
    machine.tick(600);

    // packet_id=2, slot 0 cleared, slot 1 long press, counter 0x1001.
    let expected: &[u8] = &[
        0x02, 0x01, 0x06,
        0x16, 0x16,
        0xD2, 0xFC, 0x45,
        0xD4, 0xE2, 0x89, 0xEB, 0x72, 0xBE, 0xD0, 0xC2, 0xF6, 0x83, // ciphertext
        0x01, 0x10, 0x00, 0x00, // counter advanced by one
        0x8D, 0xB8, 0x6D, 0xAB, // tag
    ];
    assert_eq!(machine.radio().last_payload(), Some(expected));
    assert_eq!(machine.replay_counter(), Some(0x1002));
}

#[test]
fn events_in_one_window_coalesce_into_one_broadcast() {
    let mut machine = encrypted_machine();
    machine.offer_event(0, ButtonEvent::Press);
    machine.offer_event(0, ButtonEvent::Press);
    machine.offer_event(3, ButtonEvent::DoublePress);
    machine.tick(0);

    // Three events, one broadcast, one sealed counter value.
    assert_eq!(machine.radio().stats().starts, 1);
    assert_eq!(machine.packet_id(), 3);
    assert_eq!(machine.replay_counter(), Some(0x1001));
}
