//! PNG encoding and decoding of pixmaps.

use crate::error::{RenderError, RenderResult};
use tiny_skia::{ColorU8, IntSize, Pixmap};

/// Decode an encoded image into a premultiplied pixmap.
pub fn decode_png(bytes: &[u8]) -> RenderResult<Pixmap> {
    let decoded = image::load_from_memory(bytes).map_err(|e| RenderError::Decode(e.to_string()))?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut data = rgba.into_raw();
    for px in data.chunks_exact_mut(4) {
        let premultiplied = ColorU8::from_rgba(px[0], px[1], px[2], px[3]).premultiply();
        px[0] = premultiplied.red();
        px[1] = premultiplied.green();
        px[2] = premultiplied.blue();
    }

    let size = IntSize::from_wh(width, height).ok_or_else(|| RenderError::Decode(format!("empty {width}x{height} image")))?;
    Pixmap::from_vec(data, size).ok_or_else(|| RenderError::Decode("pixel buffer size mismatch".to_string()))
}

/// Encode a pixmap as an RGBA PNG.
pub fn encode_png_rgba(pixmap: &Pixmap) -> RenderResult<Vec<u8>> {
    let mut data = Vec::with_capacity(pixmap.data().len());
    for px in pixmap.pixels() {
        let color = px.demultiply();
        data.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
    }
    encode(&data, pixmap.width(), pixmap.height(), png::ColorType::Rgba)
}

/// Encode an opaque pixmap as an RGB PNG, dropping the alpha channel.
pub fn encode_png_rgb(pixmap: &Pixmap) -> RenderResult<Vec<u8>> {
    let mut data = Vec::with_capacity(pixmap.pixels().len() * 3);
    for px in pixmap.pixels() {
        let color = px.demultiply();
        data.extend_from_slice(&[color.red(), color.green(), color.blue()]);
    }
    encode(&data, pixmap.width(), pixmap.height(), png::ColorType::Rgb)
}

fn encode(data: &[u8], width: u32, height: u32, color: png::ColorType) -> RenderResult<Vec<u8>> {
    let mut png_data = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut png_data, width, height);
        encoder.set_color(color);
        encoder.set_depth(png::BitDepth::Eight);

        let mut writer = encoder.write_header().map_err(|e| RenderError::Encode(e.to_string()))?;
        writer.write_image_data(data).map_err(|e| RenderError::Encode(e.to_string()))?;
        writer.finish().map_err(|e| RenderError::Encode(e.to_string()))?;
    }
    Ok(png_data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiny_skia::Color;

    #[test]
    fn test_rgba_png_preserves_opaque_pixels() {
        let mut pixmap = Pixmap::new(3, 2).unwrap();
        pixmap.fill(Color::from_rgba8(10, 200, 30, 255));

        let decoded = decode_png(&encode_png_rgba(&pixmap).unwrap()).unwrap();
        assert_eq!(decoded.width(), 3);
        assert_eq!(decoded.height(), 2);
        assert_eq!(decoded.data(), pixmap.data());
    }

    #[test]
    fn test_rgb_png_has_no_alpha() {
        let mut pixmap = Pixmap::new(4, 4).unwrap();
        pixmap.fill(Color::WHITE);

        let png = encode_png_rgb(&pixmap).unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!(decoded.color(), image::ColorType::Rgb8);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(matches!(decode_png(b"not a png"), Err(RenderError::Decode(_))));
    }
}
