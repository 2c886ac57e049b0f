//! Property-based tests:
//! - CRC detects every single-bit error
//! - link frames survive an encode/parse cycle
//! - nothing panics on arbitrary input, at any layer
//! - truncating a matched object block always yields PARAM_ERROR

use dnp3_dissect::crc::crc16;
use dnp3_dissect::link::{control_byte, encode_frame, try_parse_frame, LinkFunction};
use dnp3_dissect::transport::{Reassembler, Segment};
use dnp3_dissect::{parse_fragment, Catalogue, Config, Dissector, ErrorKind, FunctionCode};
use proptest::prelude::*;

fn link_function_strategy() -> impl Strategy<Value = LinkFunction> {
    prop_oneof![
        Just(LinkFunction::ResetLinkStates),
        Just(LinkFunction::TestLinkStates),
        Just(LinkFunction::ConfirmedUserData),
        Just(LinkFunction::UnconfirmedUserData),
        Just(LinkFunction::RequestLinkStatus),
        Just(LinkFunction::Ack),
        Just(LinkFunction::Nack),
        Just(LinkFunction::LinkStatus),
        Just(LinkFunction::NotSupported),
    ]
}

#[test]
fn prop_crc_detects_single_bit_flips() {
    proptest!(|(data in prop::collection::vec(any::<u8>(), 1..=16), bit in any::<prop::sample::Index>())| {
        let i = bit.index(data.len() * 8);
        let mut flipped = data.clone();
        flipped[i / 8] ^= 1 << (i % 8);
        prop_assert_ne!(crc16(&data), crc16(&flipped));
    });
}

#[test]
fn prop_frame_encode_parse() {
    proptest!(|(
        func in link_function_strategy(),
        dir in any::<bool>(),
        dst in any::<u16>(),
        src in any::<u16>(),
        payload in prop::collection::vec(any::<u8>(), 0..=250)
    )| {
        let control = control_byte(dir, func.is_primary(), false, false, func.code());
        let bytes = encode_frame(control, dst, src, &payload).expect("encode");
        let (frame, consumed) = try_parse_frame(&bytes).expect("frame");
        prop_assert_eq!(consumed, bytes.len());
        prop_assert!(!frame.corrupted);
        prop_assert_eq!(frame.function(), Some(func));
        prop_assert_eq!(frame.destination, dst);
        prop_assert_eq!(frame.source, src);
        prop_assert_eq!(frame.payload.unwrap_or_default(), payload);
    });
}

#[test]
fn prop_dissector_never_panics() {
    proptest!(|(chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..16))| {
        let mut d = Dissector::with_config(Config::default().with_max_contexts(4), ());
        for chunk in &chunks {
            d.feed(chunk).expect("feed");
            // Only a partial frame is ever held back.
            prop_assert!(d.pending() < 300);
        }
        d.finish().expect("finish");
    });
}

#[test]
fn prop_dissector_survives_noisy_frames() {
    proptest!(|(
        apps in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..40), 1..8),
        noise in prop::collection::vec(any::<u8>(), 0..8)
    )| {
        let control = control_byte(true, true, false, false, LinkFunction::UnconfirmedUserData.code());
        let mut stream = Vec::new();
        for (i, app) in apps.iter().enumerate() {
            let mut payload = vec![0xC0 | (i as u8 & 0x3F)];
            payload.extend_from_slice(app);
            stream.extend(encode_frame(control, 10, i as u16 % 3, &payload).expect("encode"));
            stream.extend_from_slice(&noise);
        }
        let mut d = Dissector::new(());
        d.feed(&stream).expect("feed");
        d.finish().expect("finish");
    });
}

#[test]
fn prop_fragment_parser_never_panics() {
    let catalogue = Catalogue::standard();
    proptest!(|(bytes in prop::collection::vec(any::<u8>(), 0..128))| {
        let _ = parse_fragment(&catalogue, &bytes);
    });
}

#[test]
fn prop_structured_fragments_never_panic() {
    let catalogue = Catalogue::standard();
    let codes: Vec<u8> = FunctionCode::ALL.iter().map(|f| f.code()).collect();
    proptest!(|(
        control in any::<u8>(),
        function in prop::sample::select(codes.clone()),
        group in prop::sample::select(vec![0u8, 1, 2, 3, 10, 12, 20, 30, 32, 41, 50, 60, 70, 80, 110, 120]),
        variation in 0u8..=10,
        rest in prop::collection::vec(any::<u8>(), 0..48)
    )| {
        let mut bytes = vec![control, function];
        if function & 0x80 != 0 {
            bytes.extend_from_slice(&[0, 0]);
        }
        bytes.extend_from_slice(&[group, variation]);
        bytes.extend_from_slice(&rest);
        if let Err(e) = parse_fragment(&catalogue, &bytes) {
            prop_assert!(e.kind != ErrorKind::NoParse);
            prop_assert!(e.header.is_some());
        }
    });
}

#[test]
fn prop_truncated_block_is_param_error() {
    // g32v7: flags, f32, 48-bit time; qualifier 0x28 (16-bit count and index)
    proptest!(|(count in 1u16..6, cut in any::<prop::sample::Index>())| {
        let mut block = vec![32, 7, 0x28];
        block.extend_from_slice(&count.to_le_bytes());
        for i in 0..count {
            block.extend_from_slice(&i.to_le_bytes());
            block.extend_from_slice(&[0x01, 0, 0, 0x80, 0x3F, 1, 2, 3, 4, 5, 6]);
        }
        let mut bytes = vec![0xC0, 0x82, 0x00, 0x00];
        bytes.extend_from_slice(&block);
        let catalogue = Catalogue::standard();
        prop_assert!(parse_fragment(&catalogue, &bytes).is_ok());

        // keep at least the discriminant, drop at least one byte
        let keep = 4 + 2 + cut.index(block.len() - 2);
        let err = parse_fragment(&catalogue, &bytes[..keep]).expect_err("truncated");
        prop_assert_eq!(err.kind, ErrorKind::ParamError);
    });
}

#[test]
fn prop_reassembler_bounded() {
    proptest!(|(segments in prop::collection::vec((any::<u8>(), prop::collection::vec(any::<u8>(), 0..32)), 0..64))| {
        let mut r = Reassembler::new(128);
        for (header, payload) in segments {
            let mut raw = vec![header];
            raw.extend_from_slice(&payload);
            let segment = Segment::parse(&raw).expect("non-empty");
            let _ = r.push(segment, |_| {});
            prop_assert!(r.buffered() <= r.capacity());
        }
    });
}
