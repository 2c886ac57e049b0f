//! Benchmark: synthetic stream of link frames through the full dissector
//! (framing + reassembly + application parse), plus the fragment parser and
//! CRC on their own.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dnp3_dissect::link::{control_byte, encode_frame, LinkFunction};
use dnp3_dissect::{crc16, parse_fragment, Callbacks, Catalogue, Dissector, Fragment, Frame};

#[derive(Default)]
struct Count {
    fragments: usize,
    objects: usize,
}

impl Callbacks for Count {
    fn app_fragment(&mut self, _frame: &Frame, fragment: &Fragment, _payload: &[u8]) {
        self.fragments += 1;
        self.objects += fragment.blocks.iter().map(|b| b.count as usize).sum::<usize>();
    }
}

/// Response with 100 g30v1 analog inputs (range 0..99).
fn analog_response(seq: u8) -> Vec<u8> {
    let mut app = vec![0xC0 | (seq & 0x0F), 0x81, 0x00, 0x00, 30, 1, 0x00, 0, 99];
    for i in 0..100i32 {
        app.push(0x01);
        app.extend_from_slice(&(i * 7).to_le_bytes());
    }
    app
}

/// Split an application fragment into transport segments and link frames.
fn frames(source: u16, destination: u16, app: &[u8], seq: &mut u8, out: &mut Vec<u8>) {
    let control = control_byte(false, true, false, false, LinkFunction::UnconfirmedUserData.code());
    let chunks: Vec<&[u8]> = app.chunks(249).collect();
    for (i, chunk) in chunks.iter().enumerate() {
        let mut header = *seq & 0x3F;
        if i == 0 {
            header |= 0x40;
        }
        if i == chunks.len() - 1 {
            header |= 0x80;
        }
        *seq = seq.wrapping_add(1);
        let mut payload = vec![header];
        payload.extend_from_slice(chunk);
        if let Some(frame) = encode_frame(control, destination, source, &payload) {
            out.extend(frame);
        }
    }
}

fn stream() -> Vec<u8> {
    let mut out = Vec::new();
    let mut seqs = [0u8; 8];
    for n in 0..64u8 {
        let outstation = (n % 8) as u16;
        frames(outstation + 10, 1, &analog_response(n), &mut seqs[outstation as usize], &mut out);
        // master read in between
        frames(1, outstation + 10, &[0xC0 | (n & 0x0F), 0x01, 60, 1, 0x06], &mut seqs[outstation as usize], &mut out);
    }
    out
}

fn bench_dissect(c: &mut Criterion) {
    let bytes = stream();

    c.bench_function("dissect_stream", |b| {
        b.iter(|| {
            let mut d = Dissector::new(Count::default());
            d.feed(black_box(&bytes)).ok();
            d.finish().ok();
            let count = d.into_callbacks();
            black_box((count.fragments, count.objects))
        })
    });

    c.bench_function("dissect_stream_chunked", |b| {
        b.iter(|| {
            let mut d = Dissector::new(Count::default());
            for chunk in bytes.chunks(64) {
                d.feed(black_box(chunk)).ok();
            }
            d.finish().ok();
            black_box(d.into_callbacks().fragments)
        })
    });

    let catalogue = Catalogue::standard();
    let app = analog_response(0);
    c.bench_function("parse_fragment_g30v1_x100", |b| {
        b.iter(|| parse_fragment(&catalogue, black_box(&app)).map(|f| f.blocks.len()))
    });

    c.bench_function("crc16_16_bytes", |b| b.iter(|| crc16(black_box(&bytes[10..26]))));
}

criterion_group!(benches, bench_dissect);
criterion_main!(benches);
