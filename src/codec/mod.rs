//! Decompression of `.gnu_debugdata`
//!
//! The embedded image is an xz stream. No xz library is linked in; instead the
//! xz decoder of the LZMA SDK that the platform ships as `liblzma.so` is
//! located among the loaded images and bound at first use (see [`xz_sdk`]).
//!
//! [`decompress_with`] holds the output-buffer loop and works with any
//! [`StreamDecoder`], so the loop is independent of the bound codec.

pub mod xz_sdk;

use thiserror::Error;
use tracing::trace;

use crate::module::Decompress;

/// Decompression failures
#[derive(Debug, Error)]
pub enum CodecError {
    /// The system codec could not be bound in this process
    #[error("Codec unavailable")]
    Unavailable,

    /// The codec returned an error code
    #[error("Decoder error code {0}")]
    Decode(i32),

    /// The output buffer could not grow
    #[error("Output buffer allocation failed")]
    Allocation,

    /// The codec neither consumed nor produced anything
    #[error("Decoder made no progress")]
    Stalled,

    /// Input ended before the stream was finished
    #[error("Stream not finished")]
    NotFinished,
}

/// Status reported by one decode call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoderStatus {
    NotSpecified,
    FinishedWithMark,
    NotFinished,
    NeedsMoreInput,
}

impl CoderStatus {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            1 => CoderStatus::FinishedWithMark,
            2 => CoderStatus::NotFinished,
            3 => CoderStatus::NeedsMoreInput,
            _ => CoderStatus::NotSpecified,
        }
    }
}

/// Outcome of one decode call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Input bytes consumed
    pub consumed: usize,
    /// Output bytes written
    pub produced: usize,
    pub status: CoderStatus,
}

/// A streaming decoder driven by [`decompress_with`].
pub trait StreamDecoder {
    /// Decode from `input` into `output`.
    fn decode(&mut self, output: &mut [u8], input: &[u8]) -> Result<Progress, CodecError>;

    /// Whether the stream was completely decoded.
    fn is_finished(&self) -> bool;
}

/// Smallest output buffer handed to the decoder.
const MIN_OUTPUT: usize = 64;

/// Decompress `input` with `decoder`.
///
/// The output buffer starts at twice the input size and doubles each time the
/// decoder fills it. Decoding stops at the first status other than
/// [`CoderStatus::NotFinished`], after which the decoder must confirm the
/// stream is finished. Any failure discards the partial output.
pub fn decompress_with<D>(decoder: &mut D, input: &[u8]) -> Result<Vec<u8>, CodecError>
where
    D: StreamDecoder + ?Sized,
{
    let mut output = Vec::new();
    grow(&mut output, input.len().saturating_mul(2).max(MIN_OUTPUT))?;

    let mut consumed = 0;
    let mut produced = 0;
    loop {
        if produced == output.len() {
            let doubled = output
                .len()
                .checked_mul(2)
                .ok_or(CodecError::Allocation)?;
            grow(&mut output, doubled)?;
        }

        let progress = decoder.decode(&mut output[produced..], &input[consumed..])?;
        consumed += progress.consumed.min(input.len() - consumed);
        produced += progress.produced.min(output.len() - produced);

        if progress.status != CoderStatus::NotFinished {
            break;
        }
        if progress.consumed == 0 && progress.produced == 0 {
            return Err(CodecError::Stalled);
        }
    }

    if !decoder.is_finished() {
        return Err(CodecError::NotFinished);
    }

    output.truncate(produced);
    output.shrink_to_fit();
    Ok(output)
}

fn grow(output: &mut Vec<u8>, len: usize) -> Result<(), CodecError> {
    output
        .try_reserve_exact(len - output.len())
        .map_err(|_| CodecError::Allocation)?;
    output.resize(len, 0);
    Ok(())
}

/// Decompress `input` with the system xz decoder.
pub fn decompress(input: &[u8]) -> Result<Vec<u8>, CodecError> {
    let sdk = xz_sdk::binding().ok_or(CodecError::Unavailable)?;
    let mut decoder = xz_sdk::XzDecoder::new(sdk, crate::platform::api_level());
    let output = decompress_with(&mut decoder, input)?;
    trace!(
        compressed = input.len(),
        decompressed = output.len(),
        "Decompressed with system codec"
    );
    Ok(output)
}

/// The system codec as a module decompressor
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCodec;

impl Decompress for SystemCodec {
    fn decompress(&self, input: &[u8]) -> crate::error::Result<Vec<u8>> {
        Ok(decompress(input)?)
    }
}
