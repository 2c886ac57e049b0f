//! Fragment fuzz target: parse arbitrary bytes as one application fragment.
//! Build with: cargo fuzz run fragment_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let catalogue = dnp3_dissect::Catalogue::standard();
    if let Ok(fragment) = dnp3_dissect::parse_fragment(&catalogue, data) {
        let _ = fragment.to_string();
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run fragment_fuzz");
}
