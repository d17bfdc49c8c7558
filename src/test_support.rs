//! Small helpers shared by the integration tests in `tests/`. Not part of
//! the crate's public contract — kept `#[doc(hidden)]` rather than
//! `#[cfg(test)]` because integration tests link the crate as an external
//! dependency and can't see its private `#[cfg(test)]` items.

use crate::error::Result;
use crate::mixer::{Sink, SinkInput, SinkIoState};
use crate::resampler::{convert_from_float, convert_to_float, ResampleMethod};
use crate::sample::SampleFormat;

/// Encode interleaved float samples into PCM bytes in `format`, the
/// inverse of the crate's internal `convert_to_float`.
pub fn floats_to_bytes(samples: &[f32], format: SampleFormat) -> Vec<u8> {
    convert_from_float(samples, format)
}

/// Decode PCM bytes in `format` into interleaved floats.
pub fn bytes_to_floats(bytes: &[u8], format: SampleFormat) -> Vec<f32> {
    convert_to_float(bytes, format)
}

/// Attach a sink-input directly to an I/O-thread state, bypassing the
/// command queue a running sink normally drains it through.
pub fn attach_sink_input(io: &mut SinkIoState, input: SinkInput) {
    io.push_input(input);
}

pub fn sink_input_queue_len(input: &SinkInput) -> usize {
    input.queue_len()
}

pub fn sink_input_has_resampler(input: &SinkInput) -> bool {
    input.has_resampler()
}

/// Detach `input_id` from `io` and rebind it to `to`'s spec/map, mirroring
/// what [`crate::mixer::sink::move_sink_input`] does once its message
/// round-trip completes, without needing a live I/O thread to drain it.
pub fn move_sink_input_direct(
    io: &mut SinkIoState,
    input_id: u32,
    to: &Sink,
    method: ResampleMethod,
    speex_quality: u8,
    samplerate_quality: u8,
) -> Result<Box<SinkInput>> {
    let mut input = io
        .take_input(input_id)
        .ok_or_else(|| crate::error::Error::NotFound(format!("sink-input {input_id}")))?;
    input.rebind(to, method, speex_quality, samplerate_quality)?;
    Ok(input)
}
