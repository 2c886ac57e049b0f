//! CRC and link framing: reference vectors, noise recovery, corruption and
//! semantic validation.

use dnp3_dissect::crc::crc16;
use dnp3_dissect::link::{self, control_byte, encode_frame, scan, try_parse_frame, validate_frame, LinkFunction, Scan};

const TEST_LINK_STATES: [u8; 10] = [0x05, 0x64, 0x05, 0xF2, 0x01, 0x00, 0xEF, 0xFF, 0xBF, 0xB5];

/// Unconfirmed user data 1 -> 10 carrying `C0 C0 01 01 00 17 03 41 43 42`.
const USER_DATA: [u8; 22] = [
    0x05, 0x64, 0x0F, 0xC4, 0x0A, 0x00, 0x01, 0x00, 0xC2, 0x9C, 0xC0, 0xC0, 0x01, 0x01, 0x00, 0x17, 0x03, 0x41, 0x43,
    0x42, 0xF8, 0x4B,
];

#[test]
fn test_crc_reference_values() {
    assert_eq!(crc16(b"123456789"), 0xEA82);
    assert_eq!(crc16(&TEST_LINK_STATES[..8]), 0xB5BF);
    assert_eq!(crc16(&USER_DATA[..8]), 0x9CC2);
}

#[test]
fn test_crc_single_bit_flips_detected() {
    let data = &USER_DATA[10..20];
    let good = crc16(data);
    for byte in 0..data.len() {
        for bit in 0..8 {
            let mut flipped = data.to_vec();
            flipped[byte] ^= 1 << bit;
            assert_ne!(crc16(&flipped), good, "flip byte {} bit {}", byte, bit);
        }
    }
}

#[test]
fn test_parse_test_link_states() {
    let (frame, consumed) = try_parse_frame(&TEST_LINK_STATES).expect("frame");
    assert_eq!(consumed, 10);
    assert!(!frame.corrupted);
    assert!(frame.prm());
    assert!(frame.dir());
    assert!(frame.fcb());
    assert!(frame.fcv());
    assert_eq!(frame.function(), Some(LinkFunction::TestLinkStates));
    assert_eq!(frame.source, 65519);
    assert_eq!(frame.destination, 1);
    assert_eq!(frame.payload, None);
    assert!(validate_frame(&frame));
    assert_eq!(frame.to_string(), "primary frame from master 65519 to 1: TEST_LINK_STATES (fcb=1)");
}

#[test]
fn test_header_crc_mismatch_is_corrupted() {
    let mut bytes = TEST_LINK_STATES;
    bytes[9] = 0xB4;
    let (frame, consumed) = try_parse_frame(&bytes).expect("frame");
    assert!(frame.corrupted);
    assert_eq!(consumed, 10);
    assert!(!validate_frame(&frame));
}

#[test]
fn test_block_crc_mismatch_consumes_whole_frame() {
    let mut bytes = USER_DATA.to_vec();
    bytes[12] ^= 0x01;
    bytes.extend_from_slice(&TEST_LINK_STATES);
    let (frame, consumed) = try_parse_frame(&bytes).expect("frame");
    assert!(frame.corrupted);
    assert_eq!(frame.payload, None);
    assert_eq!(consumed, USER_DATA.len());
    let (next, _) = try_parse_frame(&bytes[consumed..]).expect("next frame");
    assert_eq!(next.function(), Some(LinkFunction::TestLinkStates));
}

#[test]
fn test_user_data_frame() {
    let (frame, consumed) = try_parse_frame(&USER_DATA).expect("frame");
    assert_eq!(consumed, USER_DATA.len());
    assert_eq!(frame.function(), Some(LinkFunction::UnconfirmedUserData));
    assert_eq!(frame.source, 1);
    assert_eq!(frame.destination, 10);
    assert_eq!(frame.payload.as_deref(), Some(&USER_DATA[10..20]));
    assert!(validate_frame(&frame));
    assert!(frame.carries_user_data());
}

#[test]
fn test_stray_sync_does_not_hide_next_frame() {
    let mut bytes = vec![0x05, 0x64];
    bytes.extend_from_slice(&USER_DATA);

    let (stray, consumed) = try_parse_frame(&bytes).expect("stray header");
    assert!(stray.corrupted);
    assert_eq!(consumed, 2);

    let (frame, consumed) = try_parse_frame(&bytes[2..]).expect("frame");
    assert!(!frame.corrupted);
    assert_eq!(consumed, USER_DATA.len());
    assert_eq!((frame.source, frame.destination), (1, 10));
    assert!(validate_frame(&frame));
}

#[test]
fn test_sync_overlapping_bad_header_crc() {
    // header whose last CRC byte doubles as the first sync byte of a real frame
    let mut bytes = TEST_LINK_STATES[..9].to_vec();
    bytes.extend_from_slice(&USER_DATA);
    let (bad, consumed) = try_parse_frame(&bytes).expect("bad header");
    assert!(bad.corrupted);
    assert_eq!(consumed, 9);
    let (frame, consumed) = try_parse_frame(&bytes[9..]).expect("frame");
    assert!(!frame.corrupted);
    assert_eq!(consumed, USER_DATA.len());

    // the byte after the header is not known yet: keep the possible sync
    let (_, consumed) = try_parse_frame(&bytes[..10]).expect("bad header");
    assert_eq!(consumed, 9);
}

#[test]
fn test_noise_is_skipped() {
    let mut bytes = vec![0x00, 0x05, 0x05, 0x64, 0x02, 0xFF];
    bytes.extend_from_slice(&TEST_LINK_STATES);
    match scan(&bytes) {
        Scan::Frame { frame, skipped, consumed } => {
            assert_eq!(skipped, 6);
            assert_eq!(consumed, bytes.len());
            assert!(!frame.corrupted);
        }
        other => panic!("expected frame, got {:?}", other),
    }
}

#[test]
fn test_incomplete_input() {
    for n in 0..TEST_LINK_STATES.len() {
        assert!(try_parse_frame(&TEST_LINK_STATES[..n]).is_none(), "prefix of {} bytes", n);
    }
    assert!(try_parse_frame(&USER_DATA[..USER_DATA.len() - 1]).is_none());

    // Pure noise can be dropped, except a trailing half sync.
    assert!(matches!(scan(&[1, 2, 3, 0x05]), Scan::Incomplete { skipped: 3 }));
    assert!(matches!(scan(&[1, 2, 3]), Scan::Incomplete { skipped: 3 }));
    assert!(matches!(scan(&[9, 0x05, 0x64, 0x05]), Scan::Incomplete { skipped: 1 }));
}

#[test]
fn test_encode_then_parse_multi_block() {
    let payload: Vec<u8> = (0..=200u8).collect();
    let control = control_byte(false, true, false, false, LinkFunction::UnconfirmedUserData.code());
    let bytes = encode_frame(control, 0xFFFF, 1024, &payload).expect("encode");
    assert_eq!(bytes.len(), link::HEADER_LEN + link::blocks_len(payload.len()));
    let (frame, consumed) = try_parse_frame(&bytes).expect("frame");
    assert_eq!(consumed, bytes.len());
    assert_eq!(frame.payload.as_deref(), Some(&payload[..]));
    assert_eq!(frame.destination, 0xFFFF);
    assert_eq!(frame.source, 1024);
    assert!(frame.is_broadcast());
    assert!(validate_frame(&frame));

    assert!(encode_frame(control, 1, 2, &[0u8; 251]).is_none());
}

fn parsed(control: u8, destination: u16, source: u16, payload: &[u8]) -> link::Frame {
    let bytes = encode_frame(control, destination, source, payload).expect("encode");
    try_parse_frame(&bytes).expect("frame").0
}

#[test]
fn test_validate_fcv_rules() {
    let code = LinkFunction::ConfirmedUserData.code();
    assert!(validate_frame(&parsed(control_byte(true, true, false, true, code), 1, 2, &[0xC0])));
    assert!(!validate_frame(&parsed(control_byte(true, true, false, false, code), 1, 2, &[0xC0])));

    let reset = LinkFunction::ResetLinkStates.code();
    assert!(validate_frame(&parsed(control_byte(true, true, false, false, reset), 1, 2, &[])));
    assert!(!validate_frame(&parsed(control_byte(true, true, false, true, reset), 1, 2, &[])));
}

#[test]
fn test_validate_secondary_frames() {
    let ack = LinkFunction::Ack.code();
    assert!(validate_frame(&parsed(control_byte(false, false, false, true, ack), 1, 2, &[])));
    // Reserved bit of a secondary control octet.
    assert!(!validate_frame(&parsed(control_byte(false, false, true, false, ack), 1, 2, &[])));
    // Secondary code 5 does not exist.
    assert!(!validate_frame(&parsed(control_byte(false, false, false, false, 5), 1, 2, &[])));
}

#[test]
fn test_validate_addresses_and_payload() {
    let unconfirmed = control_byte(true, true, false, false, LinkFunction::UnconfirmedUserData.code());
    let link_status = control_byte(true, true, false, false, LinkFunction::RequestLinkStatus.code());
    assert!(!validate_frame(&parsed(unconfirmed, 1, 0xFFF0, &[0xC0])));
    assert!(!validate_frame(&parsed(link_status, 0xFFFE, 1, &[])));
    assert!(validate_frame(&parsed(link_status, 3, 1, &[])));
    // User data requires data, everything else forbids it.
    assert!(!validate_frame(&parsed(unconfirmed, 3, 1, &[])));
    assert!(!validate_frame(&parsed(link_status, 3, 1, &[0xC0])));
}
