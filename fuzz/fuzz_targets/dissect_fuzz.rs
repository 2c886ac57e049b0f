//! Stream fuzz target: split arbitrary bytes into chunks and feed them to a
//! dissector with a small context table. Nothing may panic.
//! Build with: cargo fuzz run dissect_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let (split, stream) = match data.split_first() {
        Some((&b, rest)) => (b as usize + 1, rest),
        None => return,
    };
    let config = dnp3_dissect::Config::default().with_max_contexts(4).with_max_message_bytes(512);
    let mut d = dnp3_dissect::Dissector::with_config(config, ());
    for chunk in stream.chunks(split) {
        let _ = d.feed(chunk);
    }
    let _ = d.finish();
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run dissect_fuzz");
}
