use crate::Result;

/// Decoded tile pixels
pub type TileImage = image::RgbaImage;

/// Capability to turn a downloaded body into pixels.
pub trait TileDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<TileImage>;
}

/// Decoder for the formats tile servers serve (PNG, JPEG), sniffed from the
/// body rather than trusted from the URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageDecoder;

impl TileDecoder for ImageDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<TileImage> {
        Ok(image::load_from_memory(bytes)?.to_rgba8())
    }
}
