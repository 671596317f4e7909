#![cfg(feature = "proptest")]

use proptest::prelude::*;

use bthome::{
    assemble_sealed, encode_frame, Aead, ButtonEvent, CcmAead, PacketState, SealedFrame,
    BUTTON_COUNT, ENCODED_LEN, OBJ_BUTTON_EVENT, OBJ_PACKET_ID, TAG_LEN,
};

fn arb_event() -> impl Strategy<Value = ButtonEvent> {
    (1u8..=6).prop_map(|code| ButtonEvent::from_code(code).unwrap())
}

fn arb_events() -> impl Strategy<Value = Vec<(usize, ButtonEvent)>> {
    prop::collection::vec(((0..BUTTON_COUNT), arb_event()), 0..300)
}

proptest! {
    #[test]
    fn packet_id_counts_events_mod_256(events in arb_events()) {
        let mut state = PacketState::new();
        for (slot, event) in &events {
            state.apply_event(*slot, *event);
        }
        prop_assert_eq!(state.packet_id, events.len() as u8);
    }

    #[test]
    fn encode_reflects_latest_event_per_slot(events in arb_events()) {
        let mut state = PacketState::new();
        let mut latest = [ButtonEvent::None; BUTTON_COUNT];
        for (slot, event) in &events {
            state.apply_event(*slot, *event);
            latest[*slot] = *event;
        }

        let frame = encode_frame(&state);
        prop_assert_eq!(frame[0], OBJ_PACKET_ID);
        prop_assert_eq!(frame[1], state.packet_id);
        for slot in 0..BUTTON_COUNT {
            prop_assert_eq!(frame[2 + 2 * slot], OBJ_BUTTON_EVENT);
            prop_assert_eq!(frame[3 + 2 * slot], latest[slot].code());
        }
    }

    #[test]
    fn ccm_seal_open_roundtrip(
        key in prop::array::uniform16(any::<u8>()),
        nonce in prop::array::uniform13(any::<u8>()),
        frame in prop::array::uniform10(any::<u8>()),
    ) {
        let aead = CcmAead;
        let (ciphertext, tag) = aead.seal(&key, &nonce, &frame).unwrap();
        prop_assert_ne!(ciphertext, frame);
        prop_assert_eq!(aead.open(&key, &nonce, &ciphertext, &tag).unwrap(), frame);
    }

    #[test]
    fn sealed_service_data_layout(
        ciphertext in prop::array::uniform10(any::<u8>()),
        tag in prop::array::uniform4(any::<u8>()),
        counter in any::<u32>(),
    ) {
        let sealed = SealedFrame { ciphertext, tag, replay_counter: counter };
        let sd = assemble_sealed(&sealed);
        let bytes = sd.as_bytes();

        prop_assert_eq!(bytes.len(), 3 + ENCODED_LEN + 4 + TAG_LEN);
        prop_assert_eq!(&bytes[..3], &[0xD2, 0xFC, 0x45][..]);
        prop_assert_eq!(&bytes[3..13], &ciphertext[..]);
        prop_assert_eq!(
            u32::from_le_bytes(bytes[13..17].try_into().unwrap()),
            counter
        );
        prop_assert_eq!(&bytes[17..], &tag[..]);
    }
}
