//! Input adapter: turns caller-supplied images into decoded [`Frame`]s.
//!
//! Callers hand over either raw BGR frames or encoded payloads (base64, with
//! or without a `data:image/...;base64,` prefix). Everything is normalized here,
//! once, before any detection runs.

use crate::frame::{Frame, FrameError};
use base64::{engine::general_purpose, Engine as _};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty payload")]
    Empty,
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("undecodable image: {0}")]
    Image(#[from] image::ImageError),
    #[error("invalid frame: {0}")]
    Frame(#[from] FrameError),
}

/// One image as supplied by a caller.
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Already-decoded BGR pixels.
    Raw(Frame),
    /// Base64 text, optionally a data URL.
    Encoded(String),
    /// Encoded image file bytes (JPEG, PNG, ...).
    Bytes(Vec<u8>),
}

/// A single image or an ordered capture of several.
#[derive(Debug, Clone)]
pub enum ImageInput {
    Single(ImageSource),
    Batch(Vec<ImageSource>),
}

impl From<Frame> for ImageInput {
    fn from(frame: Frame) -> Self {
        Self::Single(ImageSource::Raw(frame))
    }
}

impl From<Vec<Frame>> for ImageInput {
    fn from(frames: Vec<Frame>) -> Self {
        Self::Batch(frames.into_iter().map(ImageSource::Raw).collect())
    }
}

impl From<Vec<ImageSource>> for ImageInput {
    fn from(sources: Vec<ImageSource>) -> Self {
        Self::Batch(sources)
    }
}

impl ImageSource {
    /// Decode into a BGR frame.
    pub fn decode(self) -> Result<Frame, DecodeError> {
        match self {
            Self::Raw(frame) => Ok(frame),
            Self::Encoded(text) => decode_bytes(&decode_base64(&text)?),
            Self::Bytes(bytes) => decode_bytes(&bytes),
        }
    }
}

/// Decoded frames plus the count of items that failed to decode.
#[derive(Debug)]
pub struct NormalizedInput {
    pub frames: Vec<Frame>,
    pub skipped: usize,
}

/// Decode every item, skipping (and logging) the ones that fail.
pub fn normalize(input: ImageInput) -> NormalizedInput {
    let sources = match input {
        ImageInput::Single(source) => vec![source],
        ImageInput::Batch(sources) => sources,
    };

    let mut frames = Vec::with_capacity(sources.len());
    let mut skipped = 0usize;
    for (idx, source) in sources.into_iter().enumerate() {
        match source.decode() {
            Ok(frame) => frames.push(frame),
            Err(err) => {
                skipped += 1;
                tracing::debug!(item = idx, error = %err, "skipping undecodable image");
            }
        }
    }

    NormalizedInput { frames, skipped }
}

/// Strip an optional data-URL prefix and decode the base64 body.
pub fn decode_base64(payload: &str) -> Result<Vec<u8>, DecodeError> {
    let body = match payload.split_once(',') {
        Some((_, rest)) => rest,
        None => payload,
    };
    let body: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if body.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(general_purpose::STANDARD.decode(body)?)
}

fn decode_bytes(bytes: &[u8]) -> Result<Frame, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    let rgb = image::load_from_memory(bytes)?.to_rgb8();
    Ok(Frame::from_rgb_image(&rgb)?)
}
