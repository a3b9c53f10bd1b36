// src/frame.rs

use crate::error::FrameError;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use image::{DynamicImage, GrayImage, ImageBuffer, ImageOutputFormat, Luma, RgbImage};
use std::io::{Cursor, Read, Write};
use std::path::Path;

/// Magic bytes of a raw frame dump.
pub const RAW_MAGIC: &[u8; 4] = b"LTF1";
pub const RAW_HEADER_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Mono8,
    /// 16-bit samples, little-endian byte pairs.
    Mono16,
    Bgr8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Mono8 => 1,
            PixelFormat::Mono16 => 2,
            PixelFormat::Bgr8 => 3,
        }
    }

    fn code(self) -> u8 {
        match self {
            PixelFormat::Mono8 => 0,
            PixelFormat::Mono16 => 1,
            PixelFormat::Bgr8 => 2,
        }
    }

    /// Buffer length of a `width` x `height` frame, `None` on overflow.
    pub fn buffer_len(self, width: u32, height: u32) -> Option<usize> {
        (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(self.bytes_per_pixel())
    }

    fn from_code(code: u8) -> Result<Self, FrameError> {
        match code {
            0 => Ok(PixelFormat::Mono8),
            1 => Ok(PixelFormat::Mono16),
            2 => Ok(PixelFormat::Bgr8),
            other => Err(FrameError::UnknownFormat(other)),
        }
    }
}

/// A single captured image, row-major and tightly packed.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self, FrameError> {
        let expected = format
            .buffer_len(width, height)
            .ok_or(FrameError::TooLarge { width, height })?;
        if data.len() != expected {
            return Err(FrameError::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// Frame filled with one BGR value. Mostly useful for calibration targets and tests.
    pub fn solid_bgr(width: u32, height: u32, bgr: [u8; 3]) -> Self {
        let data = bgr
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self {
            width,
            height,
            format: PixelFormat::Bgr8,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn from_image(img: &DynamicImage) -> Self {
        match img {
            DynamicImage::ImageLuma8(gray) => Self {
                width: gray.width(),
                height: gray.height(),
                format: PixelFormat::Mono8,
                data: gray.as_raw().clone(),
            },
            DynamicImage::ImageLuma16(gray) => {
                let mut data = vec![0u8; gray.as_raw().len() * 2];
                LittleEndian::write_u16_into(gray.as_raw(), &mut data);
                Self {
                    width: gray.width(),
                    height: gray.height(),
                    format: PixelFormat::Mono16,
                    data,
                }
            }
            DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLumaA16(_) => {
                Self::from_image(&DynamicImage::ImageLuma8(img.to_luma8()))
            }
            _ => {
                let rgb = img.to_rgb8();
                let mut data = rgb.into_raw();
                for px in data.chunks_exact_mut(3) {
                    px.swap(0, 2);
                }
                Self {
                    width: img.width(),
                    height: img.height(),
                    format: PixelFormat::Bgr8,
                    data,
                }
            }
        }
    }

    /// Decodes either a raw frame dump or any image format the `image` crate knows.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.starts_with(RAW_MAGIC) {
            return read_raw_frame(bytes);
        }
        let img = image::load_from_memory(bytes)?;
        Ok(Self::from_image(&img))
    }

    pub fn open(path: &Path) -> Result<Self, FrameError> {
        let bytes = std::fs::read(path)?;
        Self::decode(&bytes)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, FrameError> {
        let bytes = STANDARD.decode(encoded.trim())?;
        Self::decode(&bytes)
    }

    /// Mean gray value on the 0-255 scale.
    ///
    /// BGR pixels use the BT.601 luma weights in 14-bit fixed point, rounded per
    /// pixel, so a neutral pixel `(v, v, v)` maps to exactly `v`. 16-bit samples
    /// are rescaled by 1/257 without rounding.
    pub fn mean_gray(&self) -> Result<f64, FrameError> {
        let count = self.width as usize * self.height as usize;
        if count == 0 {
            return Err(FrameError::Empty);
        }

        let mean = match self.format {
            PixelFormat::Mono8 => {
                let sum: u64 = self.data.iter().map(|&v| v as u64).sum();
                sum as f64 / count as f64
            }
            PixelFormat::Mono16 => {
                let sum: u64 = self
                    .data
                    .chunks_exact(2)
                    .map(|s| LittleEndian::read_u16(s) as u64)
                    .sum();
                sum as f64 / count as f64 / 257.0
            }
            PixelFormat::Bgr8 => {
                let sum: u64 = self.data.chunks_exact(3).map(|px| bgr_to_gray(px) as u64).sum();
                sum as f64 / count as f64
            }
        };
        Ok(mean)
    }

    /// 8-bit RGB buffer for display.
    pub fn to_rgb8(&self) -> Vec<u8> {
        match self.format {
            PixelFormat::Mono8 => self.data.iter().flat_map(|&v| [v, v, v]).collect(),
            PixelFormat::Mono16 => self
                .data
                .chunks_exact(2)
                .flat_map(|s| {
                    let v = (LittleEndian::read_u16(s) >> 8) as u8;
                    [v, v, v]
                })
                .collect(),
            PixelFormat::Bgr8 => self
                .data
                .chunks_exact(3)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect(),
        }
    }

    fn to_dynamic_image(&self) -> DynamicImage {
        match self.format {
            PixelFormat::Mono8 => {
                let gray = GrayImage::from_raw(self.width, self.height, self.data.clone())
                    .unwrap_or_else(|| GrayImage::new(self.width, self.height));
                DynamicImage::ImageLuma8(gray)
            }
            PixelFormat::Mono16 => {
                let mut samples = vec![0u16; self.data.len() / 2];
                LittleEndian::read_u16_into(&self.data, &mut samples);
                let gray: ImageBuffer<Luma<u16>, Vec<u16>> =
                    ImageBuffer::from_raw(self.width, self.height, samples)
                        .unwrap_or_else(|| ImageBuffer::new(self.width, self.height));
                DynamicImage::ImageLuma16(gray)
            }
            PixelFormat::Bgr8 => {
                let rgb = RgbImage::from_raw(self.width, self.height, self.to_rgb8())
                    .unwrap_or_else(|| RgbImage::new(self.width, self.height));
                DynamicImage::ImageRgb8(rgb)
            }
        }
    }

    pub fn encode_png(&self) -> Result<Vec<u8>, FrameError> {
        let mut out = Cursor::new(Vec::new());
        self.to_dynamic_image()
            .write_to(&mut out, ImageOutputFormat::Png)?;
        Ok(out.into_inner())
    }

    /// PNG bytes, base64 encoded, the form images are stored in the database.
    pub fn to_base64_png(&self) -> Result<String, FrameError> {
        Ok(STANDARD.encode(self.encode_png()?))
    }
}

fn bgr_to_gray(px: &[u8]) -> u8 {
    const B: u32 = 1868;
    const G: u32 = 9617;
    const R: u32 = 4899;
    ((px[0] as u32 * B + px[1] as u32 * G + px[2] as u32 * R + (1 << 13)) >> 14) as u8
}

/// Reads a raw frame dump: `LTF1`, u32 width, u32 height, u8 format, 3 reserved bytes, pixels.
pub fn read_raw_frame<R: Read>(mut reader: R) -> Result<Frame, FrameError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != RAW_MAGIC {
        return Err(FrameError::BadMagic);
    }

    let width = reader.read_u32::<LittleEndian>()?;
    let height = reader.read_u32::<LittleEndian>()?;
    let format = PixelFormat::from_code(reader.read_u8()?)?;
    let mut reserved = [0u8; 3];
    reader.read_exact(&mut reserved)?;

    let expected = format
        .buffer_len(width, height)
        .ok_or(FrameError::TooLarge { width, height })?;
    let mut data = Vec::new();
    reader.take(expected as u64).read_to_end(&mut data)?;
    if data.len() != expected {
        return Err(FrameError::SizeMismatch {
            expected,
            actual: data.len(),
        });
    }

    Frame::new(width, height, format, data)
}

pub fn write_raw_frame<W: Write>(mut writer: W, frame: &Frame) -> Result<(), FrameError> {
    writer.write_all(RAW_MAGIC)?;
    writer.write_u32::<LittleEndian>(frame.width)?;
    writer.write_u32::<LittleEndian>(frame.height)?;
    writer.write_u8(frame.format.code())?;
    writer.write_all(&[0u8; 3])?;
    writer.write_all(&frame.data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_bgr_mean_equals_channel_value() {
        let frame = Frame::solid_bgr(20, 20, [150, 150, 150]);
        assert_eq!(frame.mean_gray().unwrap(), 150.0);
    }

    #[test]
    fn bgr_uses_bt601_weights() {
        // pure red: 0.299 * 255 = 76.2
        let frame = Frame::solid_bgr(2, 2, [0, 0, 255]);
        assert_eq!(frame.mean_gray().unwrap(), 76.0);
        // pure green: 0.587 * 255 = 149.7
        let frame = Frame::solid_bgr(2, 2, [0, 255, 0]);
        assert_eq!(frame.mean_gray().unwrap(), 150.0);
    }

    #[test]
    fn mono16_is_rescaled_to_8_bit() {
        let mut data = vec![0u8; 8];
        LittleEndian::write_u16_into(&[65535, 65535, 0, 0], &mut data);
        let frame = Frame::new(2, 2, PixelFormat::Mono16, data).unwrap();
        approx::assert_relative_eq!(frame.mean_gray().unwrap(), 127.5);
    }

    #[test]
    fn size_mismatch_is_rejected() {
        let err = Frame::new(4, 4, PixelFormat::Bgr8, vec![0; 10]).unwrap_err();
        assert!(matches!(err, FrameError::SizeMismatch { expected: 48, actual: 10 }));
    }

    #[test]
    fn empty_frame_has_no_mean() {
        let frame = Frame::new(0, 0, PixelFormat::Mono8, Vec::new()).unwrap();
        assert!(matches!(frame.mean_gray(), Err(FrameError::Empty)));
    }

    #[test]
    fn raw_dump_survives_write_and_read() {
        let mut data = vec![0u8; 6 * 2];
        LittleEndian::write_u16_into(&[1, 2, 300, 4000, 50000, 65535], &mut data);
        let frame = Frame::new(3, 2, PixelFormat::Mono16, data).unwrap();

        let mut buf = Vec::new();
        write_raw_frame(&mut buf, &frame).unwrap();
        assert_eq!(buf.len(), RAW_HEADER_LEN + 12);
        assert_eq!(&buf[..4], b"LTF1");

        let back = Frame::decode(&buf).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn raw_dump_with_short_payload_fails() {
        let frame = Frame::solid_bgr(4, 4, [1, 2, 3]);
        let mut buf = Vec::new();
        write_raw_frame(&mut buf, &frame).unwrap();
        buf.truncate(buf.len() - 5);
        assert!(matches!(
            read_raw_frame(&buf[..]),
            Err(FrameError::SizeMismatch { expected: 48, actual: 43 })
        ));
    }

    fn raw_header(width: u32, height: u32, format: u8) -> Vec<u8> {
        let mut buf = RAW_MAGIC.to_vec();
        buf.write_u32::<LittleEndian>(width).unwrap();
        buf.write_u32::<LittleEndian>(height).unwrap();
        buf.extend_from_slice(&[format, 0, 0, 0]);
        buf
    }

    #[test]
    fn raw_dump_with_overflowing_size_fails() {
        let buf = raw_header(u32::MAX, u32::MAX, 2);
        assert!(matches!(
            read_raw_frame(&buf[..]),
            Err(FrameError::TooLarge {
                width: u32::MAX,
                height: u32::MAX
            })
        ));
        assert!(matches!(
            Frame::new(u32::MAX, u32::MAX, PixelFormat::Bgr8, Vec::new()),
            Err(FrameError::TooLarge { .. })
        ));
    }

    #[test]
    fn raw_dump_with_huge_header_and_no_payload_fails() {
        let mut buf = raw_header(100_000, 100_000, 0);
        buf.extend_from_slice(&[7; 16]);
        assert!(matches!(
            read_raw_frame(&buf[..]),
            Err(FrameError::SizeMismatch {
                expected: 10_000_000_000,
                actual: 16
            })
        ));
    }

    #[test]
    fn luma16_image_becomes_mono16() {
        let gray = ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(2, 1, vec![65535, 0]).unwrap();
        let frame = Frame::from_image(&DynamicImage::ImageLuma16(gray));
        assert_eq!(frame.format(), PixelFormat::Mono16);
        assert_eq!(frame.data(), &[0xff, 0xff, 0, 0]);
        approx::assert_relative_eq!(frame.mean_gray().unwrap(), 127.5);
    }

    #[test]
    fn raw_dump_with_unknown_format_fails() {
        let mut buf = Vec::new();
        buf.extend_from_slice(RAW_MAGIC);
        buf.extend_from_slice(&[1, 0, 0, 0, 1, 0, 0, 0, 9, 0, 0, 0]);
        assert!(matches!(read_raw_frame(&buf[..]), Err(FrameError::UnknownFormat(9))));
    }

    #[test]
    fn png_base64_keeps_gray_levels() {
        let frame = Frame::solid_bgr(5, 3, [200, 200, 200]);
        let encoded = frame.to_base64_png().unwrap();
        let back = Frame::from_base64(&encoded).unwrap();
        assert_eq!(back.width(), 5);
        assert_eq!(back.height(), 3);
        assert_eq!(back.mean_gray().unwrap(), 200.0);
    }
}
