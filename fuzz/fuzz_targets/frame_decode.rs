//! Fuzz target for `FrameCodec::decode_next`.
//!
//! Feeds arbitrary byte streams into the codec's feed/decode_next loop -
//! the same loop the per-connection task runs against live socket bytes.
//! Must never panic: garbage, truncated frames, and adversarial declared
//! lengths are all expected input, not exceptional ones.

#![no_main]

use gt06_proto::{DecodeOutcome, FrameCodec};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut codec = FrameCodec::new();
    codec.feed(data);

    loop {
        match codec.decode_next() {
            DecodeOutcome::Frame(_) | DecodeOutcome::SkippedGarbage { .. } => continue,
            DecodeOutcome::NeedMoreData => break,
        }
    }
});
