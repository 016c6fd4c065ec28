//! Device-independent bitmap codec.
//!
//! Decodes every published DIB header generation into one canonical form
//! (a [`BitmapHeader`] plus a 32-bit BGRA pixel buffer in file row order)
//! and encodes the canonical form back out as either a classic info-header
//! DIB or a V5 DIB. The input bytes are untrusted: every offset is
//! validated against the buffer before it is read, and structural
//! violations surface as [`ClipboardError::MalformedBitmap`].

use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use tracing::{debug, warn};

use crate::convert::{DataConverter, ShapeCaps};
use crate::{ClipboardError, ClipboardResult};

/// Size of the optional BITMAPFILEHEADER prefix.
const FILE_HEADER_SIZE: usize = 14;

/// BITMAPINFOHEADER size in bytes.
const INFO_HEADER_SIZE: u32 = 40;

/// BITMAPV5HEADER size in bytes.
const V5_HEADER_SIZE: u32 = 124;

/// LCS_sRGB color space type ("sRGB" in little-endian ASCII).
const LCS_SRGB: u32 = 0x7352_4742;

/// LCS_WINDOWS_COLOR_SPACE ("Win " in little-endian ASCII).
const LCS_WINDOWS: u32 = 0x5769_6E20;

/// PROFILE_LINKED ("LINK" in little-endian ASCII).
const PROFILE_LINKED: u32 = 0x4C49_4E4B;

/// PROFILE_EMBEDDED ("MBED" in little-endian ASCII).
const PROFILE_EMBEDDED: u32 = 0x4D42_4544;

/// LCS_GM_IMAGES rendering intent (perceptual).
const LCS_GM_IMAGES: u32 = 2;

/// Upper bound on either image dimension. Headers are attacker-supplied;
/// this caps the allocation a malicious RLE header can request.
const MAX_DIMENSION: u32 = 65_536;

/// Upper bound on the decoded pixel buffer (512 MiB). Headers declaring
/// a larger image are rejected before anything is allocated.
const MAX_PIXEL_BYTES: usize = 512 * 1024 * 1024;

// =============================================================================
// Canonical header
// =============================================================================

/// Pixel data compression mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Uncompressed
    Rgb,
    /// Run-length encoding, 8 bits per pixel
    Rle8,
    /// Run-length encoding, 4 bits per pixel
    Rle4,
    /// Uncompressed with explicit RGB channel masks
    Bitfields,
    /// Embedded JPEG stream (passthrough only, not expanded)
    Jpeg,
    /// Embedded PNG stream (passthrough only, not expanded)
    Png,
    /// Uncompressed with explicit RGBA channel masks
    AlphaBitfields,
}

impl TryFrom<u32> for Compression {
    type Error = ClipboardError;

    fn try_from(raw: u32) -> ClipboardResult<Self> {
        match raw {
            0 => Ok(Self::Rgb),
            1 => Ok(Self::Rle8),
            2 => Ok(Self::Rle4),
            3 => Ok(Self::Bitfields),
            4 => Ok(Self::Jpeg),
            5 => Ok(Self::Png),
            6 => Ok(Self::AlphaBitfields),
            other => Err(ClipboardError::MalformedBitmap(format!(
                "unknown compression mode {other}"
            ))),
        }
    }
}

impl Compression {
    fn to_raw(self) -> u32 {
        match self {
            Self::Rgb => 0,
            Self::Rle8 => 1,
            Self::Rle4 => 2,
            Self::Bitfields => 3,
            Self::Jpeg => 4,
            Self::Png => 5,
            Self::AlphaBitfields => 6,
        }
    }
}

/// Declared color space of the pixel data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    /// sRGB (also the default for headers that predate the field)
    Srgb,
    /// System default color space
    WindowsDefault,
    /// Calibrated endpoints and gamma values in the header
    Calibrated,
    /// Profile referenced by file path (treated as pass-through)
    ProfileLinked,
    /// ICC profile embedded after the header
    ProfileEmbedded,
}

impl TryFrom<u32> for ColorSpace {
    type Error = ClipboardError;

    fn try_from(raw: u32) -> ClipboardResult<Self> {
        match raw {
            0 => Ok(Self::Calibrated),
            LCS_SRGB => Ok(Self::Srgb),
            LCS_WINDOWS => Ok(Self::WindowsDefault),
            PROFILE_LINKED => Ok(Self::ProfileLinked),
            PROFILE_EMBEDDED => Ok(Self::ProfileEmbedded),
            other => Err(ClipboardError::MalformedBitmap(format!(
                "unrecognized color space tag {other:#010x}"
            ))),
        }
    }
}

/// Canonical form of every DIB header generation.
///
/// Fields absent from older header layouts default to values implying an
/// opaque, uncompressed, sRGB image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitmapHeader {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels (absolute value)
    pub height: u32,
    /// True when the source stored rows top-down (negative declared height)
    pub top_down: bool,
    /// Declared bits per pixel
    pub bits_per_pixel: u16,
    /// Declared compression mode
    pub compression: Compression,
    /// Red channel mask (resolved, including defaults)
    pub red_mask: u32,
    /// Green channel mask
    pub green_mask: u32,
    /// Blue channel mask
    pub blue_mask: u32,
    /// Alpha channel mask; zero means no declared alpha
    pub alpha_mask: u32,
    /// Declared color space
    pub color_space: ColorSpace,
    /// Embedded ICC profile bytes, when the header carries one
    pub profile: Option<Vec<u8>>,
}

/// A decoded bitmap: canonical header plus BGRA8 pixels.
///
/// The pixel buffer holds exactly `width * height * 4` bytes in the file's
/// row order; `header.top_down` records the source orientation for callers
/// that need to flip bottom-up images for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    /// Canonical header
    pub header: BitmapHeader,
    /// BGRA8 pixel data, 4 bytes per pixel
    pub pixels: Vec<u8>,
}

impl Bitmap {
    /// Build a bitmap from raw BGRA8 pixels.
    ///
    /// Fails when the buffer length does not match the dimensions or a
    /// dimension exceeds the supported range.
    pub fn from_bgra(width: u32, height: u32, pixels: Vec<u8>) -> ClipboardResult<Self> {
        if width == 0 || height == 0 {
            return Err(ClipboardError::MalformedBitmap(
                "zero image dimension".to_string(),
            ));
        }
        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(ClipboardError::MalformedBitmap(format!(
                "image dimension {width}x{height} exceeds supported range"
            )));
        }
        let expected = (width as usize) * (height as usize) * 4;
        if pixels.len() != expected {
            return Err(ClipboardError::MalformedBitmap(format!(
                "pixel buffer is {} bytes, expected {expected}",
                pixels.len()
            )));
        }
        Ok(Self {
            header: BitmapHeader {
                width,
                height,
                top_down: true,
                bits_per_pixel: 32,
                compression: Compression::Rgb,
                red_mask: 0x00FF_0000,
                green_mask: 0x0000_FF00,
                blue_mask: 0x0000_00FF,
                alpha_mask: 0xFF00_0000,
                color_space: ColorSpace::Srgb,
                profile: None,
            },
            pixels,
        })
    }
}

// =============================================================================
// Color management collaborator
// =============================================================================

/// Where the source color description came from
#[derive(Debug, Clone, Copy)]
pub enum ColorSource<'a> {
    /// Calibrated endpoints/gamma declared in the header
    Calibrated,
    /// ICC profile bytes embedded after the header
    EmbeddedProfile(&'a [u8]),
}

/// External color-management hook.
///
/// The codec hands decoded BGRA pixels to this collaborator when the
/// header declares a non-default color space. Without a collaborator the
/// pixels pass through unmodified, which is a documented degraded path,
/// not an error.
pub trait ColorTransform: Send + Sync {
    /// Transform BGRA8 pixels in place to sRGB
    fn to_srgb(&self, pixels: &mut [u8], source: ColorSource<'_>) -> ClipboardResult<()>;
}

// =============================================================================
// Decode
// =============================================================================

fn read_u16(data: &[u8], off: usize) -> ClipboardResult<u16> {
    data.get(off..off + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| ClipboardError::MalformedBitmap("truncated header".to_string()))
}

fn read_u32(data: &[u8], off: usize) -> ClipboardResult<u32> {
    data.get(off..off + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| ClipboardError::MalformedBitmap("truncated header".to_string()))
}

fn read_i32(data: &[u8], off: usize) -> ClipboardResult<i32> {
    read_u32(data, off).map(|v| v as i32)
}

struct Parsed {
    header: BitmapHeader,
    palette: Vec<[u8; 4]>,
    pixel_start: usize,
}

/// Pure transform between DIB byte buffers and [`Bitmap`] values
#[derive(Debug, Default)]
pub struct DibCodec;

/// Which header generation [`DibCodec::encode`] emits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// 40-byte BITMAPINFOHEADER, uncompressed (widest compatibility)
    Info,
    /// 124-byte BITMAPV5HEADER with explicit masks and sRGB tagging
    V5,
}

impl DibCodec {
    /// Decode a DIB byte buffer without color management
    pub fn decode(data: &[u8]) -> ClipboardResult<Bitmap> {
        Self::decode_with_color(data, None)
    }

    /// Decode a DIB byte buffer, handing non-sRGB pixels to `color` for
    /// an in-place transform when one is provided.
    pub fn decode_with_color(
        data: &[u8],
        color: Option<&dyn ColorTransform>,
    ) -> ClipboardResult<Bitmap> {
        let mut parsed = Self::parse(data)?;
        let pixels = Self::expand(data, &mut parsed)?;
        let mut bitmap = Bitmap {
            header: parsed.header,
            pixels,
        };

        let source = match bitmap.header.color_space {
            ColorSpace::Calibrated => Some(ColorSource::Calibrated),
            ColorSpace::ProfileEmbedded => bitmap
                .header
                .profile
                .as_deref()
                .map(ColorSource::EmbeddedProfile),
            _ => None,
        };
        if let Some(source) = source {
            match color {
                Some(transform) => {
                    transform.to_srgb(&mut bitmap.pixels, source)?;
                }
                None => {
                    warn!(
                        color_space = ?bitmap.header.color_space,
                        "no color transform available, passing pixels through"
                    );
                }
            }
        }
        Ok(bitmap)
    }

    fn parse(data: &[u8]) -> ClipboardResult<Parsed> {
        // Optional file header prefix
        let mut declared_offset = None;
        let mut cursor = 0usize;
        if data.len() >= FILE_HEADER_SIZE && data[0] == b'B' && data[1] == b'M' {
            declared_offset = Some(read_u32(data, 10)? as usize);
            cursor = FILE_HEADER_SIZE;
        }
        let info_start = cursor;

        let header_size = read_u32(data, info_start)?;
        let (width_raw, height_raw, planes, bpp);
        let mut compression_raw = 0u32;
        let mut clr_used = 0u32;
        match header_size {
            12 => {
                width_raw = read_u16(data, info_start + 4)? as i32;
                height_raw = read_u16(data, info_start + 6)? as i32;
                planes = read_u16(data, info_start + 8)?;
                bpp = read_u16(data, info_start + 10)?;
            }
            16 => {
                width_raw = read_i32(data, info_start + 4)?;
                height_raw = read_i32(data, info_start + 8)?;
                planes = read_u16(data, info_start + 12)?;
                bpp = read_u16(data, info_start + 14)?;
            }
            40 | 42 | 46 | 52 | 56 | 64 | 108 | 124 => {
                width_raw = read_i32(data, info_start + 4)?;
                height_raw = read_i32(data, info_start + 8)?;
                planes = read_u16(data, info_start + 12)?;
                bpp = read_u16(data, info_start + 14)?;
                compression_raw = read_u32(data, info_start + 16)?;
                clr_used = read_u32(data, info_start + 32)?;
            }
            other => {
                return Err(ClipboardError::MalformedBitmap(format!(
                    "unsupported header size {other}"
                )));
            }
        }
        if data.len() < info_start + header_size as usize {
            return Err(ClipboardError::MalformedBitmap(
                "truncated header".to_string(),
            ));
        }

        let compression = Compression::try_from(compression_raw)?;
        let width = width_raw.unsigned_abs();
        let height = height_raw.unsigned_abs();
        let top_down = height_raw < 0;

        if planes != 1 {
            return Err(ClipboardError::MalformedBitmap(format!(
                "plane count {planes}, expected 1"
            )));
        }
        if width == 0 || height == 0 || width_raw < 0 {
            return Err(ClipboardError::MalformedBitmap(format!(
                "invalid dimensions {width_raw}x{height_raw}"
            )));
        }
        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(ClipboardError::MalformedBitmap(format!(
                "image dimension {width}x{height} exceeds supported range"
            )));
        }
        if !matches!(bpp, 1 | 2 | 4 | 8 | 16 | 24 | 32) {
            return Err(ClipboardError::MalformedBitmap(format!(
                "unsupported bit depth {bpp}"
            )));
        }
        match compression {
            Compression::Rle8 if bpp != 8 => {
                return Err(ClipboardError::MalformedBitmap(format!(
                    "RLE8 requires 8 bits per pixel, got {bpp}"
                )));
            }
            Compression::Rle4 if bpp != 4 => {
                return Err(ClipboardError::MalformedBitmap(format!(
                    "RLE4 requires 4 bits per pixel, got {bpp}"
                )));
            }
            Compression::Rle8 | Compression::Rle4 if top_down => {
                return Err(ClipboardError::MalformedBitmap(
                    "RLE bitmaps must be bottom-up".to_string(),
                ));
            }
            Compression::Bitfields | Compression::AlphaBitfields
                if !matches!(bpp, 16 | 32) =>
            {
                return Err(ClipboardError::MalformedBitmap(format!(
                    "bitfields require 16 or 32 bits per pixel, got {bpp}"
                )));
            }
            _ => {}
        }

        // Default masks for direct-color depths
        let (mut red_mask, mut green_mask, mut blue_mask) = match bpp {
            16 => (0x7C00, 0x03E0, 0x001F),
            24 | 32 => (0x00FF_0000, 0x0000_FF00, 0x0000_00FF),
            _ => (0, 0, 0),
        };
        let mut alpha_mask = 0u32;

        let mut cursor = info_start + header_size as usize;

        // Explicit masks directly after a bare info header
        if header_size == 40
            && matches!(
                compression,
                Compression::Bitfields | Compression::AlphaBitfields
            )
        {
            red_mask = read_u32(data, cursor)?;
            green_mask = read_u32(data, cursor + 4)?;
            blue_mask = read_u32(data, cursor + 8)?;
            cursor += 12;
            if compression == Compression::AlphaBitfields {
                alpha_mask = read_u32(data, cursor)?;
                cursor += 4;
            }
        }

        // Masks embedded in V2+ headers override the defaults when set
        if header_size >= 52 {
            let (r, g, b) = (
                read_u32(data, info_start + 40)?,
                read_u32(data, info_start + 44)?,
                read_u32(data, info_start + 48)?,
            );
            if r | g | b != 0 {
                red_mask = r;
                green_mask = g;
                blue_mask = b;
            }
        }
        if header_size >= 56 {
            let a = read_u32(data, info_start + 52)?;
            if a != 0 {
                alpha_mask = a;
            }
        }

        // Color space and embedded profile (V4/V5 headers)
        let mut color_space = ColorSpace::Srgb;
        let mut profile = None;
        if header_size >= 108 {
            color_space = ColorSpace::try_from(read_u32(data, info_start + 56)?)?;
        }
        if header_size >= 124 && color_space == ColorSpace::ProfileEmbedded {
            let offset = read_u32(data, info_start + 112)? as usize;
            let size = read_u32(data, info_start + 116)? as usize;
            let start = info_start
                .checked_add(offset)
                .ok_or_else(|| ClipboardError::MalformedBitmap("profile offset overflow".to_string()))?;
            let end = start.checked_add(size).filter(|&e| e <= data.len()).ok_or_else(|| {
                ClipboardError::MalformedBitmap("embedded profile out of bounds".to_string())
            })?;
            profile = Some(data[start..end].to_vec());
        }

        // Palette
        let mut palette = Vec::new();
        if bpp < 16 || clr_used > 0 {
            let count = if clr_used > 0 {
                clr_used as usize
            } else {
                1usize << bpp
            };
            if count > 256 || (bpp < 16 && count > (1usize << bpp)) {
                return Err(ClipboardError::MalformedBitmap(format!(
                    "palette of {count} entries exceeds limit for {bpp}bpp"
                )));
            }
            let entry_size = if header_size == 12 { 3 } else { 4 };
            for i in 0..count {
                let off = cursor + i * entry_size;
                let entry = data.get(off..off + entry_size).ok_or_else(|| {
                    ClipboardError::MalformedBitmap("truncated palette".to_string())
                })?;
                palette.push([entry[0], entry[1], entry[2], 255]);
            }
            cursor += count * entry_size;
        }

        // File header wins on where the pixels start
        let pixel_start = match declared_offset {
            Some(offset) => {
                if offset > data.len() {
                    return Err(ClipboardError::MalformedBitmap(
                        "declared pixel offset out of bounds".to_string(),
                    ));
                }
                offset
            }
            None => cursor,
        };

        Ok(Parsed {
            header: BitmapHeader {
                width,
                height,
                top_down,
                bits_per_pixel: bpp,
                compression,
                red_mask,
                green_mask,
                blue_mask,
                alpha_mask,
                color_space,
                profile,
            },
            palette,
            pixel_start,
        })
    }

    fn expand(data: &[u8], parsed: &mut Parsed) -> ClipboardResult<Vec<u8>> {
        let header = &parsed.header;
        let out_len = (header.width as usize) * (header.height as usize) * 4;
        if out_len > MAX_PIXEL_BYTES {
            return Err(ClipboardError::MalformedBitmap(format!(
                "decoded image of {out_len} bytes exceeds the allocation budget"
            )));
        }
        match header.compression {
            Compression::Jpeg => Err(ClipboardError::UnsupportedFormat(
                "embedded JPEG stream".to_string(),
            )),
            Compression::Png => Err(ClipboardError::UnsupportedFormat(
                "embedded PNG stream".to_string(),
            )),
            Compression::Rle8 | Compression::Rle4 => Self::expand_rle(data, parsed),
            Compression::Rgb | Compression::Bitfields | Compression::AlphaBitfields => {
                if header.bits_per_pixel < 16 {
                    Self::expand_indexed(data, parsed)
                } else {
                    Self::expand_direct(data, parsed)
                }
            }
        }
    }

    fn expand_indexed(data: &[u8], parsed: &Parsed) -> ClipboardResult<Vec<u8>> {
        let header = &parsed.header;
        let (width, height) = (header.width as usize, header.height as usize);
        let bpp = header.bits_per_pixel as usize;
        let stride = (bpp * width).div_ceil(32) * 4;
        let pixels_per_byte = 8 / bpp;
        let mask = ((1u16 << bpp) - 1) as u8;

        // The input must hold every declared row before anything is allocated
        match stride
            .checked_mul(height)
            .and_then(|n| n.checked_add(parsed.pixel_start))
        {
            Some(needed) if needed <= data.len() => {}
            _ => {
                return Err(ClipboardError::MalformedBitmap(
                    "pixel data truncated".to_string(),
                ));
            }
        }

        let mut out = vec![0u8; width * height * 4];
        for row in 0..height {
            let row_start = parsed.pixel_start + row * stride;
            let row_bytes = data.get(row_start..row_start + stride).ok_or_else(|| {
                ClipboardError::MalformedBitmap("pixel data truncated".to_string())
            })?;
            for x in 0..width {
                let byte = row_bytes[x / pixels_per_byte];
                let shift = (pixels_per_byte - 1 - x % pixels_per_byte) * bpp;
                let index = ((byte >> shift) & mask) as usize;
                let entry = parsed.palette.get(index).ok_or_else(|| {
                    ClipboardError::MalformedBitmap(format!(
                        "palette index {index} out of range"
                    ))
                })?;
                out[(row * width + x) * 4..(row * width + x) * 4 + 4].copy_from_slice(entry);
            }
        }
        Ok(out)
    }

    fn expand_rle(data: &[u8], parsed: &Parsed) -> ClipboardResult<Vec<u8>> {
        let header = &parsed.header;
        let (width, height) = (header.width as usize, header.height as usize);
        let rle4 = header.compression == Compression::Rle4;

        let mut out = vec![0u8; width * height * 4];
        let mut pos = parsed.pixel_start;
        let mut x = 0usize;
        let mut row = 0usize;

        let write_run = |out: &mut [u8], palette: &[[u8; 4]], row: usize, x: usize, index: usize|
         -> ClipboardResult<()> {
            let entry = palette.get(index).ok_or_else(|| {
                ClipboardError::MalformedBitmap(format!("palette index {index} out of range"))
            })?;
            let at = (row * width + x) * 4;
            out[at..at + 4].copy_from_slice(entry);
            Ok(())
        };

        loop {
            let pair = data.get(pos..pos + 2).ok_or_else(|| {
                ClipboardError::MalformedBitmap("RLE stream truncated".to_string())
            })?;
            let (count, value) = (pair[0] as usize, pair[1]);
            pos += 2;

            if count > 0 {
                // Encoded run
                if row >= height || x + count > width {
                    return Err(ClipboardError::MalformedBitmap(
                        "RLE run past declared bounds".to_string(),
                    ));
                }
                for i in 0..count {
                    let index = if rle4 {
                        let nibble = if i % 2 == 0 { value >> 4 } else { value & 0x0F };
                        nibble as usize
                    } else {
                        value as usize
                    };
                    write_run(&mut out, &parsed.palette, row, x + i, index)?;
                }
                x += count;
                continue;
            }

            match value {
                0 => {
                    // End of line
                    x = 0;
                    row += 1;
                    if row > height {
                        return Err(ClipboardError::MalformedBitmap(
                            "RLE data past declared height".to_string(),
                        ));
                    }
                }
                1 => break, // End of bitmap
                2 => {
                    let delta = data.get(pos..pos + 2).ok_or_else(|| {
                        ClipboardError::MalformedBitmap("RLE delta truncated".to_string())
                    })?;
                    pos += 2;
                    x += delta[0] as usize;
                    row += delta[1] as usize;
                    if x > width || row > height {
                        return Err(ClipboardError::MalformedBitmap(
                            "RLE delta past declared bounds".to_string(),
                        ));
                    }
                }
                literal => {
                    let count = literal as usize;
                    if row >= height || x + count > width {
                        return Err(ClipboardError::MalformedBitmap(
                            "RLE run past declared bounds".to_string(),
                        ));
                    }
                    let byte_len = if rle4 { count.div_ceil(2) } else { count };
                    let padded = byte_len.div_ceil(2) * 2; // runs are word aligned
                    let run = data.get(pos..pos + byte_len).ok_or_else(|| {
                        ClipboardError::MalformedBitmap("RLE stream truncated".to_string())
                    })?;
                    for i in 0..count {
                        let index = if rle4 {
                            let byte = run[i / 2];
                            let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0F };
                            nibble as usize
                        } else {
                            run[i] as usize
                        };
                        write_run(&mut out, &parsed.palette, row, x + i, index)?;
                    }
                    x += count;
                    pos += padded;
                }
            }
        }
        Ok(out)
    }

    fn expand_direct(data: &[u8], parsed: &mut Parsed) -> ClipboardResult<Vec<u8>> {
        let header = &parsed.header;
        let bpp = header.bits_per_pixel;

        // Some producers fill the formally reserved high byte of 32bpp
        // pixels with alpha without declaring a mask for it. Watch that
        // byte on the first pass and restart once if it turns out live.
        let claimed = header.red_mask | header.green_mask | header.blue_mask | header.alpha_mask;
        let watch_reserved = bpp == 32 && header.alpha_mask == 0 && claimed & 0xFF00_0000 == 0;

        match Self::direct_pass(data, parsed, header.alpha_mask, watch_reserved)? {
            DirectPass::Done(out) => Ok(out),
            DirectPass::ReservedByteLive => {
                debug!("reserved byte carries data, restarting decode with alpha");
                parsed.header.alpha_mask = 0xFF00_0000;
                match Self::direct_pass(data, parsed, 0xFF00_0000, false)? {
                    DirectPass::Done(out) => Ok(out),
                    DirectPass::ReservedByteLive => unreachable!("watch disabled on restart"),
                }
            }
        }
    }

    fn direct_pass(
        data: &[u8],
        parsed: &Parsed,
        alpha_mask: u32,
        watch_reserved: bool,
    ) -> ClipboardResult<DirectPass> {
        let header = &parsed.header;
        let (width, height) = (header.width as usize, header.height as usize);
        let bpp = header.bits_per_pixel as usize;
        let bytes_per_px = bpp / 8;
        let stride = (bpp * width).div_ceil(32) * 4;

        // The input must hold every declared row before anything is allocated
        match stride
            .checked_mul(height)
            .and_then(|n| n.checked_add(parsed.pixel_start))
        {
            Some(needed) if needed <= data.len() => {}
            _ => {
                return Err(ClipboardError::MalformedBitmap(
                    "pixel data truncated".to_string(),
                ));
            }
        }

        let mut out = vec![0u8; width * height * 4];
        for row in 0..height {
            let row_start = parsed.pixel_start + row * stride;
            let row_bytes = data.get(row_start..row_start + stride).ok_or_else(|| {
                ClipboardError::MalformedBitmap("pixel data truncated".to_string())
            })?;
            for x in 0..width {
                let at = x * bytes_per_px;
                let raw = match bytes_per_px {
                    2 => u16::from_le_bytes([row_bytes[at], row_bytes[at + 1]]) as u32,
                    3 => u32::from_le_bytes([
                        row_bytes[at],
                        row_bytes[at + 1],
                        row_bytes[at + 2],
                        0,
                    ]),
                    _ => u32::from_le_bytes([
                        row_bytes[at],
                        row_bytes[at + 1],
                        row_bytes[at + 2],
                        row_bytes[at + 3],
                    ]),
                };
                if watch_reserved && raw & 0xFF00_0000 != 0 {
                    return Ok(DirectPass::ReservedByteLive);
                }
                let o = (row * width + x) * 4;
                out[o] = extract_channel(raw, header.blue_mask);
                out[o + 1] = extract_channel(raw, header.green_mask);
                out[o + 2] = extract_channel(raw, header.red_mask);
                out[o + 3] = if alpha_mask == 0 {
                    255
                } else {
                    extract_channel(raw, alpha_mask)
                };
            }
        }
        Ok(DirectPass::Done(out))
    }

    /// Serialize a bitmap. `with_file_header` prepends the 14-byte file
    /// header with the correct pixel-data offset.
    pub fn encode(bitmap: &Bitmap, mode: WriteMode, with_file_header: bool) -> ClipboardResult<Vec<u8>> {
        let (width, height) = (bitmap.header.width, bitmap.header.height);
        let expected = (width as usize) * (height as usize) * 4;
        // The size fields on the wire are 32-bit
        let image_size = u32::try_from(expected).map_err(|_| {
            ClipboardError::MalformedBitmap(format!(
                "image of {expected} bytes does not fit the DIB size fields"
            ))
        })?;
        if bitmap.pixels.len() != expected {
            return Err(ClipboardError::MalformedBitmap(format!(
                "pixel buffer is {} bytes, expected {expected}",
                bitmap.pixels.len()
            )));
        }

        let header_size = match mode {
            WriteMode::Info => INFO_HEADER_SIZE,
            WriteMode::V5 => V5_HEADER_SIZE,
        };
        let file_prefix = if with_file_header { FILE_HEADER_SIZE } else { 0 };
        let total = file_prefix + header_size as usize + expected;
        let total_size = u32::try_from(total).map_err(|_| {
            ClipboardError::MalformedBitmap(format!(
                "image of {expected} bytes does not fit the DIB size fields"
            ))
        })?;

        let mut buf = BytesMut::with_capacity(total);
        if with_file_header {
            buf.put_u8(b'B');
            buf.put_u8(b'M');
            buf.put_u32_le(total_size);
            buf.put_u16_le(0);
            buf.put_u16_le(0);
            buf.put_u32_le((file_prefix + header_size as usize) as u32);
        }

        buf.put_u32_le(header_size);
        buf.put_i32_le(i32::try_from(width).unwrap_or(i32::MAX));
        // Always top-down so the canonical row order is preserved on the wire
        buf.put_i32_le(-i32::try_from(height).unwrap_or(i32::MAX));
        buf.put_u16_le(1); // planes
        buf.put_u16_le(32); // bit count
        let compression = match mode {
            WriteMode::Info => Compression::Rgb,
            WriteMode::V5 => Compression::Bitfields,
        };
        buf.put_u32_le(compression.to_raw());
        buf.put_u32_le(image_size);
        buf.put_i32_le(0); // x pixels per meter
        buf.put_i32_le(0); // y pixels per meter
        buf.put_u32_le(0); // colors used
        buf.put_u32_le(0); // colors important

        if mode == WriteMode::V5 {
            buf.put_u32_le(0x00FF_0000); // red mask
            buf.put_u32_le(0x0000_FF00); // green mask
            buf.put_u32_le(0x0000_00FF); // blue mask
            buf.put_u32_le(0xFF00_0000); // alpha mask
            buf.put_u32_le(LCS_SRGB);
            for _ in 0..9 {
                buf.put_u32_le(0); // CIEXYZTRIPLE endpoints, unused for sRGB
            }
            buf.put_u32_le(0); // gamma red
            buf.put_u32_le(0); // gamma green
            buf.put_u32_le(0); // gamma blue
            buf.put_u32_le(LCS_GM_IMAGES);
            buf.put_u32_le(0); // profile offset
            buf.put_u32_le(0); // profile size
            buf.put_u32_le(0); // reserved
        }

        buf.put_slice(&bitmap.pixels);
        Ok(buf.to_vec())
    }
}

enum DirectPass {
    Done(Vec<u8>),
    ReservedByteLive,
}

/// Extract one channel through its mask, renormalized to 8 bits
fn extract_channel(raw: u32, mask: u32) -> u8 {
    if mask == 0 {
        return 0;
    }
    let shift = mask.trailing_zeros();
    let bits = mask.count_ones();
    let value = (raw & mask) >> shift;
    if bits == 8 {
        value as u8
    } else if bits < 8 {
        let max = (1u32 << bits) - 1;
        ((value * 255 + max / 2) / max) as u8
    } else {
        (value >> (bits - 8)) as u8
    }
}

// =============================================================================
// Catalog-facing converters
// =============================================================================

/// Bitmap converter targeting the classic info-header wire form (CF_DIB)
pub struct ImageDib {
    color: Option<Arc<dyn ColorTransform>>,
}

impl ImageDib {
    /// Converter without color management
    pub fn new() -> Self {
        Self { color: None }
    }

    /// Converter that hands non-sRGB pixels to `transform` on read
    pub fn with_transform(transform: Arc<dyn ColorTransform>) -> Self {
        Self {
            color: Some(transform),
        }
    }
}

impl Default for ImageDib {
    fn default() -> Self {
        Self::new()
    }
}

impl DataConverter<Bitmap> for ImageDib {
    fn caps(&self) -> ShapeCaps {
        ShapeCaps::BLOCK_READ.union(ShapeCaps::BLOCK_WRITE)
    }

    fn read_block(&self, data: &[u8]) -> ClipboardResult<Bitmap> {
        DibCodec::decode_with_color(data, self.color.as_deref())
    }

    fn write_block(&self, value: &Bitmap) -> ClipboardResult<Vec<u8>> {
        DibCodec::encode(value, WriteMode::Info, false)
    }
}

/// Bitmap converter targeting the V5 wire form (CF_DIBV5)
pub struct ImageDibV5 {
    color: Option<Arc<dyn ColorTransform>>,
}

impl ImageDibV5 {
    /// Converter without color management
    pub fn new() -> Self {
        Self { color: None }
    }

    /// Converter that hands non-sRGB pixels to `transform` on read
    pub fn with_transform(transform: Arc<dyn ColorTransform>) -> Self {
        Self {
            color: Some(transform),
        }
    }
}

impl Default for ImageDibV5 {
    fn default() -> Self {
        Self::new()
    }
}

impl DataConverter<Bitmap> for ImageDibV5 {
    fn caps(&self) -> ShapeCaps {
        ShapeCaps::BLOCK_READ.union(ShapeCaps::BLOCK_WRITE)
    }

    fn read_block(&self, data: &[u8]) -> ClipboardResult<Bitmap> {
        DibCodec::decode_with_color(data, self.color.as_deref())
    }

    fn write_block(&self, value: &Bitmap) -> ClipboardResult<Vec<u8>> {
        DibCodec::encode(value, WriteMode::V5, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two-pixel-wide, two-pixel-tall BGRA test image with live alpha
    fn sample_pixels() -> Vec<u8> {
        vec![
            0x10, 0x20, 0x30, 0xFF, // (0,0)
            0x40, 0x50, 0x60, 0x80, // (1,0)
            0x70, 0x80, 0x90, 0xFF, // (0,1)
            0xA0, 0xB0, 0xC0, 0x01, // (1,1)
        ]
    }

    fn put_u32(buf: &mut Vec<u8>, v: u32) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    fn put_u16(buf: &mut Vec<u8>, v: u16) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Build an info-style header of the given size with trailing zeros
    fn info_header(size: u32, width: i32, height: i32, bpp: u16, compression: u32, clr_used: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        put_u32(&mut buf, size);
        put_u32(&mut buf, width as u32);
        put_u32(&mut buf, height as u32);
        put_u16(&mut buf, 1);
        put_u16(&mut buf, bpp);
        put_u32(&mut buf, compression);
        put_u32(&mut buf, 0); // image size
        put_u32(&mut buf, 0);
        put_u32(&mut buf, 0);
        put_u32(&mut buf, clr_used);
        put_u32(&mut buf, 0);
        buf.resize(size as usize, 0);
        buf
    }

    #[test]
    fn test_roundtrip_info_mode() {
        let bitmap = Bitmap::from_bgra(2, 2, sample_pixels()).unwrap();
        let wire = DibCodec::encode(&bitmap, WriteMode::Info, false).unwrap();
        let decoded = DibCodec::decode(&wire).unwrap();
        assert_eq!(decoded.pixels, bitmap.pixels);
        assert_eq!(decoded.header.width, 2);
        assert_eq!(decoded.header.height, 2);
        assert!(decoded.header.top_down);
    }

    #[test]
    fn test_roundtrip_v5_mode() {
        let bitmap = Bitmap::from_bgra(2, 2, sample_pixels()).unwrap();
        let wire = DibCodec::encode(&bitmap, WriteMode::V5, false).unwrap();
        let decoded = DibCodec::decode(&wire).unwrap();
        assert_eq!(decoded.pixels, bitmap.pixels);
        assert_eq!(decoded.header.alpha_mask, 0xFF00_0000);
        assert_eq!(decoded.header.color_space, ColorSpace::Srgb);
    }

    #[test]
    fn test_roundtrip_with_file_header() {
        let bitmap = Bitmap::from_bgra(2, 2, sample_pixels()).unwrap();
        let wire = DibCodec::encode(&bitmap, WriteMode::V5, true).unwrap();
        assert_eq!(&wire[..2], b"BM");
        let offset = u32::from_le_bytes([wire[10], wire[11], wire[12], wire[13]]);
        assert_eq!(offset, 14 + 124);
        let decoded = DibCodec::decode(&wire).unwrap();
        assert_eq!(decoded.pixels, bitmap.pixels);
    }

    #[test]
    fn test_all_header_sizes_decode() {
        // 12-byte core header: 1bpp, 2x1, 3-byte palette entries
        let mut core = Vec::new();
        put_u32(&mut core, 12);
        put_u16(&mut core, 2); // width
        put_u16(&mut core, 1); // height
        put_u16(&mut core, 1); // planes
        put_u16(&mut core, 1); // bpp
        core.extend_from_slice(&[0, 0, 0, 255, 255, 255]); // palette
        core.extend_from_slice(&[0x80, 0, 0, 0]); // one padded row
        let decoded = DibCodec::decode(&core).unwrap();
        assert_eq!((decoded.header.width, decoded.header.height), (2, 1));
        assert_eq!(decoded.header.bits_per_pixel, 1);
        assert_eq!(&decoded.pixels[..4], &[255, 255, 255, 255]); // index 1
        assert_eq!(&decoded.pixels[4..8], &[0, 0, 0, 255]); // index 0

        // 16-byte header: 1bpp, 4-byte palette entries
        let mut os2 = Vec::new();
        put_u32(&mut os2, 16);
        put_u32(&mut os2, 2);
        put_u32(&mut os2, 1);
        put_u16(&mut os2, 1);
        put_u16(&mut os2, 1);
        os2.extend_from_slice(&[0, 0, 0, 0, 255, 255, 255, 0]);
        os2.extend_from_slice(&[0x40, 0, 0, 0]);
        let decoded = DibCodec::decode(&os2).unwrap();
        assert_eq!(decoded.header.bits_per_pixel, 1);
        assert_eq!(&decoded.pixels[..4], &[0, 0, 0, 255]);

        // Info-style generations, 1x1 32bpp uncompressed
        for size in [40u32, 42, 46, 52, 56, 64, 108, 124] {
            let mut wire = info_header(size, 1, -1, 32, 0, 0);
            if size >= 108 {
                wire[56..60].copy_from_slice(&LCS_SRGB.to_le_bytes());
            }
            wire.extend_from_slice(&[1, 2, 3, 0]);
            let decoded = DibCodec::decode(&wire)
                .unwrap_or_else(|e| panic!("size {size} failed: {e}"));
            assert_eq!((decoded.header.width, decoded.header.height), (1, 1));
            assert_eq!(decoded.header.bits_per_pixel, 32);
        }
    }

    #[test]
    fn test_unknown_header_size_rejected() {
        let wire = info_header(99, 1, 1, 32, 0, 0);
        assert!(matches!(
            DibCodec::decode(&wire),
            Err(ClipboardError::MalformedBitmap(_))
        ));
    }

    #[test]
    fn test_rle8_opcode_stream() {
        // 4x2 bottom-up RLE8: three pixels of index 9 on the first stored
        // row, end-of-line, two of index 5, end-of-bitmap
        let mut wire = info_header(40, 4, 2, 8, 1, 10);
        for i in 0u8..10 {
            wire.extend_from_slice(&[i, i, i, 0]); // grayscale palette
        }
        wire.extend_from_slice(&[3, 9, 0, 0, 2, 5, 0, 1]);
        let decoded = DibCodec::decode(&wire).unwrap();
        assert!(!decoded.header.top_down);
        let px = |x: usize, y: usize| &decoded.pixels[(y * 4 + x) * 4..(y * 4 + x) * 4 + 4];
        for x in 0..3 {
            assert_eq!(px(x, 0), &[9, 9, 9, 255]);
        }
        assert_eq!(px(3, 0), &[0, 0, 0, 0]); // background
        for x in 0..2 {
            assert_eq!(px(x, 1), &[5, 5, 5, 255]);
        }
        assert_eq!(px(2, 1), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_rle8_delta_and_literal() {
        // delta to (2,1), then a 3-pixel literal run
        let mut wire = info_header(40, 5, 2, 8, 1, 8);
        for i in 0u8..8 {
            wire.extend_from_slice(&[i, i, i, 0]);
        }
        wire.extend_from_slice(&[0, 2, 2, 1, 0, 3, 6, 7, 6, 0, 0, 1]);
        let decoded = DibCodec::decode(&wire).unwrap();
        let px = |x: usize, y: usize| &decoded.pixels[(y * 5 + x) * 4..(y * 5 + x) * 4 + 4];
        assert_eq!(px(2, 1), &[6, 6, 6, 255]);
        assert_eq!(px(3, 1), &[7, 7, 7, 255]);
        assert_eq!(px(4, 1), &[6, 6, 6, 255]);
        assert_eq!(px(0, 0), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_rle_run_past_width_rejected() {
        let mut wire = info_header(40, 2, 1, 8, 1, 2);
        wire.extend_from_slice(&[0, 0, 0, 0, 1, 1, 1, 0]);
        wire.extend_from_slice(&[5, 1, 0, 1]); // run of 5 into width 2
        assert!(matches!(
            DibCodec::decode(&wire),
            Err(ClipboardError::MalformedBitmap(_))
        ));
    }

    #[test]
    fn test_palette_index_out_of_range() {
        // 8bpp with a 2-entry palette and a pixel referencing index 5
        let mut wire = info_header(40, 1, 1, 8, 0, 2);
        wire.extend_from_slice(&[0, 0, 0, 0, 255, 255, 255, 0]);
        wire.extend_from_slice(&[5, 0, 0, 0]);
        assert!(matches!(
            DibCodec::decode(&wire),
            Err(ClipboardError::MalformedBitmap(_))
        ));
    }

    #[test]
    fn test_palette_overflow_rejected() {
        // 4bpp cannot declare 300 used colors
        let wire = info_header(40, 1, 1, 4, 0, 300);
        assert!(matches!(
            DibCodec::decode(&wire),
            Err(ClipboardError::MalformedBitmap(_))
        ));
    }

    #[test]
    fn test_fake_alpha_restart() {
        // BI_RGB 32bpp with a live reserved byte in the second pixel
        let mut wire = info_header(40, 2, -1, 32, 0, 0);
        wire.extend_from_slice(&[0x33, 0x22, 0x11, 0x00]);
        wire.extend_from_slice(&[0x66, 0x55, 0x44, 0xFF]);
        let decoded = DibCodec::decode(&wire).unwrap();
        assert_eq!(decoded.header.alpha_mask, 0xFF00_0000);
        assert_eq!(&decoded.pixels[..4], &[0x33, 0x22, 0x11, 0x00]);
        assert_eq!(&decoded.pixels[4..8], &[0x66, 0x55, 0x44, 0xFF]);
    }

    #[test]
    fn test_zero_reserved_byte_stays_opaque() {
        let mut wire = info_header(40, 2, -1, 32, 0, 0);
        wire.extend_from_slice(&[0x33, 0x22, 0x11, 0x00]);
        wire.extend_from_slice(&[0x66, 0x55, 0x44, 0x00]);
        let decoded = DibCodec::decode(&wire).unwrap();
        assert_eq!(decoded.header.alpha_mask, 0);
        assert_eq!(decoded.pixels[3], 255);
        assert_eq!(decoded.pixels[7], 255);
    }

    #[test]
    fn test_16bpp_default_masks_renormalize() {
        // 5-5-5: all-ones channels must come out as 255, not 248
        let mut wire = info_header(40, 1, -1, 16, 0, 0);
        wire.extend_from_slice(&0x7FFFu16.to_le_bytes());
        wire.extend_from_slice(&[0, 0]); // row padding
        let decoded = DibCodec::decode(&wire).unwrap();
        assert_eq!(&decoded.pixels[..4], &[255, 255, 255, 255]);
    }

    #[test]
    fn test_explicit_masks_after_info_header() {
        // BITFIELDS masks trailing a 40-byte header, RGB order swapped
        let mut wire = info_header(40, 1, -1, 32, 3, 0);
        put_u32(&mut wire, 0x0000_00FF); // red in low byte
        put_u32(&mut wire, 0x0000_FF00);
        put_u32(&mut wire, 0x00FF_0000);
        wire.extend_from_slice(&[0x11, 0x22, 0x33, 0x00]);
        let decoded = DibCodec::decode(&wire).unwrap();
        // canonical order is BGRA
        assert_eq!(&decoded.pixels[..4], &[0x33, 0x22, 0x11, 255]);
    }

    #[test]
    fn test_rle_requires_bottom_up() {
        let mut wire = info_header(40, 2, -2, 8, 1, 2);
        wire.extend_from_slice(&[0, 0, 0, 0, 1, 1, 1, 0]);
        wire.extend_from_slice(&[0, 1]);
        assert!(matches!(
            DibCodec::decode(&wire),
            Err(ClipboardError::MalformedBitmap(_))
        ));
    }

    #[test]
    fn test_embedded_jpeg_unsupported() {
        let wire = info_header(40, 1, 1, 32, 4, 0);
        assert!(matches!(
            DibCodec::decode(&wire),
            Err(ClipboardError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_wrong_plane_count_rejected() {
        let mut wire = info_header(40, 1, 1, 32, 0, 0);
        wire[12] = 2;
        wire.extend_from_slice(&[0, 0, 0, 0]);
        assert!(matches!(
            DibCodec::decode(&wire),
            Err(ClipboardError::MalformedBitmap(_))
        ));
    }

    #[test]
    fn test_profile_out_of_bounds_rejected() {
        let mut wire = info_header(124, 1, -1, 32, 0, 0);
        wire[56..60].copy_from_slice(&PROFILE_EMBEDDED.to_le_bytes());
        wire[112..116].copy_from_slice(&1000u32.to_le_bytes()); // profile offset
        wire[116..120].copy_from_slice(&64u32.to_le_bytes()); // profile size
        wire.extend_from_slice(&[0, 0, 0, 0]);
        assert!(matches!(
            DibCodec::decode(&wire),
            Err(ClipboardError::MalformedBitmap(_))
        ));
    }

    #[test]
    fn test_profile_extracted() {
        let mut wire = info_header(124, 1, -1, 32, 0, 0);
        wire[56..60].copy_from_slice(&PROFILE_EMBEDDED.to_le_bytes());
        // profile right after the pixel data: header(124) + pixels(4)
        wire[112..116].copy_from_slice(&128u32.to_le_bytes());
        wire[116..120].copy_from_slice(&4u32.to_le_bytes());
        wire.extend_from_slice(&[1, 2, 3, 0]); // pixel
        wire.extend_from_slice(&[0xAA, 0xBB, 0xCC, 0xDD]); // profile bytes
        let decoded = DibCodec::decode(&wire).unwrap();
        assert_eq!(decoded.header.profile.as_deref(), Some(&[0xAA, 0xBB, 0xCC, 0xDD][..]));
    }

    #[test]
    fn test_color_transform_invoked_for_embedded_profile() {
        struct Invert;
        impl ColorTransform for Invert {
            fn to_srgb(&self, pixels: &mut [u8], source: ColorSource<'_>) -> ClipboardResult<()> {
                assert!(matches!(source, ColorSource::EmbeddedProfile(_)));
                for b in pixels.iter_mut() {
                    *b = !*b;
                }
                Ok(())
            }
        }

        let mut wire = info_header(124, 1, -1, 32, 0, 0);
        wire[56..60].copy_from_slice(&PROFILE_EMBEDDED.to_le_bytes());
        wire[112..116].copy_from_slice(&128u32.to_le_bytes());
        wire[116..120].copy_from_slice(&2u32.to_le_bytes());
        wire.extend_from_slice(&[0x00, 0x00, 0x00, 0xFF]);
        wire.extend_from_slice(&[0x01, 0x02]);
        let decoded = DibCodec::decode_with_color(&wire, Some(&Invert)).unwrap();
        assert_eq!(&decoded.pixels[..4], &[0xFF, 0xFF, 0xFF, 0x00]);
    }

    #[test]
    fn test_missing_transform_passes_through() {
        let mut wire = info_header(108, 1, -1, 32, 0, 0);
        // cs_type 0 = calibrated, collaborator absent
        wire.extend_from_slice(&[7, 8, 9, 0]);
        let decoded = DibCodec::decode(&wire).unwrap();
        assert_eq!(decoded.header.color_space, ColorSpace::Calibrated);
        assert_eq!(&decoded.pixels[..3], &[7, 8, 9]);
    }

    #[test]
    fn test_unknown_color_space_rejected() {
        let mut wire = info_header(108, 1, -1, 32, 0, 0);
        wire[56..60].copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        wire.extend_from_slice(&[0, 0, 0, 0]);
        assert!(matches!(
            DibCodec::decode(&wire),
            Err(ClipboardError::MalformedBitmap(_))
        ));
    }

    #[test]
    fn test_bottom_up_rows_kept_in_file_order() {
        // 1x2 bottom-up: the first stored row lands on output row 0
        let mut wire = info_header(40, 1, 2, 24, 0, 0);
        wire.extend_from_slice(&[1, 1, 1, 0]); // stored first
        wire.extend_from_slice(&[2, 2, 2, 0]); // stored second
        let decoded = DibCodec::decode(&wire).unwrap();
        assert!(!decoded.header.top_down);
        assert_eq!(&decoded.pixels[..4], &[1, 1, 1, 255]);
        assert_eq!(&decoded.pixels[4..8], &[2, 2, 2, 255]);
    }

    #[test]
    fn test_huge_dimensions_rejected_without_allocating() {
        // 40 bytes claiming a 60000x60000 32bpp image (a 14.4 GB decode)
        let wire = info_header(40, 60_000, 60_000, 32, 0, 0);
        assert!(matches!(
            DibCodec::decode(&wire),
            Err(ClipboardError::MalformedBitmap(_))
        ));
    }

    #[test]
    fn test_huge_rle_dimensions_rejected() {
        // RLE output size cannot be read off the stream, so the declared
        // dimensions alone must stop the decode
        let mut wire = info_header(40, 60_000, 60_000, 8, 1, 1);
        wire.extend_from_slice(&[0, 0, 0, 0]); // one palette entry
        wire.extend_from_slice(&[0, 1]); // immediate end of bitmap
        assert!(matches!(
            DibCodec::decode(&wire),
            Err(ClipboardError::MalformedBitmap(_))
        ));
    }

    #[test]
    fn test_truncated_pixel_data_rejected() {
        // 4x4 32bpp needs 64 bytes of pixels; only 8 are present
        let mut wire = info_header(40, 4, 4, 32, 0, 0);
        wire.extend_from_slice(&[0u8; 8]);
        assert!(matches!(
            DibCodec::decode(&wire),
            Err(ClipboardError::MalformedBitmap(_))
        ));
    }

    #[test]
    fn test_oversized_image_rejected_on_encode() {
        // 40000x40000x4 overflows the 32-bit size fields
        let mut bitmap = Bitmap::from_bgra(2, 2, sample_pixels()).unwrap();
        bitmap.header.width = 40_000;
        bitmap.header.height = 40_000;
        assert!(matches!(
            DibCodec::encode(&bitmap, WriteMode::Info, true),
            Err(ClipboardError::MalformedBitmap(_))
        ));
    }

    #[test]
    fn test_converters_roundtrip() {
        let bitmap = Bitmap::from_bgra(2, 2, sample_pixels()).unwrap();
        for conv in [&ImageDib::new() as &dyn DataConverter<Bitmap>, &ImageDibV5::new()] {
            let wire = conv.write_block(&bitmap).unwrap();
            assert_eq!(conv.read_block(&wire).unwrap().pixels, bitmap.pixels);
        }
    }
}
