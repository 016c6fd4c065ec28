//! Text and file-list converters.
//!
//! Covers the simple clipboard payloads: UTF-16LE text, Windows-1252
//! (ANSI) text, UTF-8 text for registered formats, and the DROPFILES
//! file list. All four converters serve both block and stream shapes so
//! they work against any partner without bridging.

use std::io::{Read, Write};

use bytes::{BufMut, BytesMut};

use crate::convert::{DataConverter, ShapeCaps};
use crate::{ClipboardError, ClipboardResult};

fn all_shapes() -> ShapeCaps {
    ShapeCaps::BLOCK_READ
        .union(ShapeCaps::STREAM_READ)
        .union(ShapeCaps::BLOCK_WRITE)
        .union(ShapeCaps::STREAM_WRITE)
}

fn drain(stream: &mut dyn Read) -> ClipboardResult<Vec<u8>> {
    let mut out = Vec::new();
    stream.read_to_end(&mut out)?;
    Ok(out)
}

// =============================================================================
// Unicode text (UTF-16LE)
// =============================================================================

/// UTF-16LE text with a NUL terminator, the native wire form of
/// CF_UNICODETEXT.
#[derive(Debug, Default)]
pub struct TextUnicode;

impl TextUnicode {
    fn decode(data: &[u8]) -> ClipboardResult<String> {
        if data.len() % 2 != 0 {
            return Err(ClipboardError::InvalidUtf16);
        }
        let units: Vec<u16> = data
            .chunks_exact(2)
            .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
            .collect();
        // Stop at the terminator rather than requiring one
        let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
        String::from_utf16(&units[..end]).map_err(|_| ClipboardError::InvalidUtf16)
    }

    fn encode(text: &str) -> Vec<u8> {
        let mut out: Vec<u8> = text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        out.extend_from_slice(&[0, 0]);
        out
    }
}

impl DataConverter<String> for TextUnicode {
    fn caps(&self) -> ShapeCaps {
        all_shapes()
    }

    fn read_block(&self, data: &[u8]) -> ClipboardResult<String> {
        Self::decode(data)
    }

    fn read_stream(&self, stream: &mut dyn Read) -> ClipboardResult<String> {
        Self::decode(&drain(stream)?)
    }

    fn write_block(&self, value: &String) -> ClipboardResult<Vec<u8>> {
        Ok(Self::encode(value))
    }

    fn write_stream(&self, value: &String, out: &mut dyn Write) -> ClipboardResult<()> {
        out.write_all(&Self::encode(value))?;
        Ok(())
    }
}

// =============================================================================
// ANSI text (Windows-1252)
// =============================================================================

/// Windows-1252 text with a NUL terminator (CF_TEXT, CF_OEMTEXT).
///
/// Characters outside the codepage are replaced with `?` on write.
#[derive(Debug, Default)]
pub struct TextAnsi;

impl TextAnsi {
    fn decode(data: &[u8]) -> String {
        let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        data[..end].iter().map(|&b| windows1252_to_char(b)).collect()
    }

    fn encode(text: &str) -> Vec<u8> {
        let mut out: Vec<u8> = text.chars().map(char_to_windows1252).collect();
        out.push(0);
        out
    }
}

impl DataConverter<String> for TextAnsi {
    fn caps(&self) -> ShapeCaps {
        all_shapes()
    }

    fn read_block(&self, data: &[u8]) -> ClipboardResult<String> {
        Ok(Self::decode(data))
    }

    fn read_stream(&self, stream: &mut dyn Read) -> ClipboardResult<String> {
        Ok(Self::decode(&drain(stream)?))
    }

    fn write_block(&self, value: &String) -> ClipboardResult<Vec<u8>> {
        Ok(Self::encode(value))
    }

    fn write_stream(&self, value: &String, out: &mut dyn Write) -> ClipboardResult<()> {
        out.write_all(&Self::encode(value))?;
        Ok(())
    }
}

// =============================================================================
// UTF-8 text
// =============================================================================

/// UTF-8 text with a NUL terminator, used by registered text formats
/// such as "HTML Format".
#[derive(Debug, Default)]
pub struct TextUtf8;

impl TextUtf8 {
    fn decode(data: &[u8]) -> ClipboardResult<String> {
        let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        std::str::from_utf8(&data[..end])
            .map(str::to_owned)
            .map_err(|_| ClipboardError::InvalidUtf8)
    }

    fn encode(text: &str) -> Vec<u8> {
        let mut out = text.as_bytes().to_vec();
        out.push(0);
        out
    }
}

impl DataConverter<String> for TextUtf8 {
    fn caps(&self) -> ShapeCaps {
        all_shapes()
    }

    fn read_block(&self, data: &[u8]) -> ClipboardResult<String> {
        Self::decode(data)
    }

    fn read_stream(&self, stream: &mut dyn Read) -> ClipboardResult<String> {
        Self::decode(&drain(stream)?)
    }

    fn write_block(&self, value: &String) -> ClipboardResult<Vec<u8>> {
        Ok(Self::encode(value))
    }

    fn write_stream(&self, value: &String, out: &mut dyn Write) -> ClipboardResult<()> {
        out.write_all(&Self::encode(value))?;
        Ok(())
    }
}

// =============================================================================
// File drop list (DROPFILES)
// =============================================================================

/// Byte size of the fixed DROPFILES header
const DROPFILES_HEADER: usize = 20;

/// The CF_HDROP payload: a DROPFILES header followed by a NUL-separated
/// path list ending in a double NUL. Writes always emit wide (UTF-16LE)
/// paths; reads honor the header's `fWide` flag.
#[derive(Debug, Default)]
pub struct FileDropList;

impl FileDropList {
    fn decode(data: &[u8]) -> ClipboardResult<Vec<String>> {
        if data.len() < DROPFILES_HEADER {
            return Err(ClipboardError::UnsupportedFormat(
                "file drop payload shorter than its header".to_string(),
            ));
        }
        let p_files = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        let wide = u32::from_le_bytes([data[16], data[17], data[18], data[19]]) != 0;
        if p_files < DROPFILES_HEADER || p_files >= data.len() {
            return Err(ClipboardError::UnsupportedFormat(
                "file drop list offset out of bounds".to_string(),
            ));
        }
        let list = &data[p_files..];

        let mut paths = Vec::new();
        if wide {
            let mut pos = 0;
            loop {
                let mut units = Vec::new();
                while pos + 2 <= list.len() {
                    let u = u16::from_le_bytes([list[pos], list[pos + 1]]);
                    pos += 2;
                    if u == 0 {
                        break;
                    }
                    units.push(u);
                }
                if units.is_empty() {
                    break;
                }
                paths.push(String::from_utf16(&units).map_err(|_| ClipboardError::InvalidUtf16)?);
            }
        } else {
            let mut pos = 0;
            while pos < list.len() {
                let end = list[pos..]
                    .iter()
                    .position(|&b| b == 0)
                    .unwrap_or(list.len() - pos);
                if end == 0 {
                    break;
                }
                let path: String = list[pos..pos + end]
                    .iter()
                    .map(|&b| windows1252_to_char(b))
                    .collect();
                paths.push(path);
                pos += end + 1;
            }
        }
        Ok(paths)
    }

    fn encode(paths: &[String]) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(DROPFILES_HEADER + 32 * paths.len());
        buf.put_u32_le(DROPFILES_HEADER as u32); // pFiles
        buf.put_i32_le(0); // pt.x (unused)
        buf.put_i32_le(0); // pt.y (unused)
        buf.put_u32_le(0); // fNC (unused)
        buf.put_u32_le(1); // fWide

        for path in paths {
            for u in path.encode_utf16() {
                buf.put_u16_le(u);
            }
            buf.put_u16_le(0);
        }
        buf.put_u16_le(0);
        buf.to_vec()
    }
}

impl DataConverter<Vec<String>> for FileDropList {
    fn caps(&self) -> ShapeCaps {
        all_shapes()
    }

    fn read_block(&self, data: &[u8]) -> ClipboardResult<Vec<String>> {
        Self::decode(data)
    }

    fn read_stream(&self, stream: &mut dyn Read) -> ClipboardResult<Vec<String>> {
        Self::decode(&drain(stream)?)
    }

    fn write_block(&self, value: &Vec<String>) -> ClipboardResult<Vec<u8>> {
        Ok(Self::encode(value))
    }

    fn write_stream(&self, value: &Vec<String>, out: &mut dyn Write) -> ClipboardResult<()> {
        out.write_all(&Self::encode(value))?;
        Ok(())
    }
}

// =============================================================================
// Windows-1252 codepage
// =============================================================================

fn char_to_windows1252(c: char) -> u8 {
    let cp = c as u32;

    // ASCII maps directly
    if cp < 128 {
        return cp as u8;
    }

    // 128-159 hold codepage-specific characters; 160-255 match Latin-1
    match cp {
        0x20AC => 128, // €
        0x201A => 130, // ‚
        0x0192 => 131, // ƒ
        0x201E => 132, // „
        0x2026 => 133, // …
        0x2020 => 134, // †
        0x2021 => 135, // ‡
        0x02C6 => 136, // ˆ
        0x2030 => 137, // ‰
        0x0160 => 138, // Š
        0x2039 => 139, // ‹
        0x0152 => 140, // Œ
        0x017D => 142, // Ž
        0x2018 => 145,
        0x2019 => 146,
        0x201C => 147,
        0x201D => 148,
        0x2022 => 149, // •
        0x2013 => 150,
        0x2014 => 151,
        0x02DC => 152, // ˜
        0x2122 => 153, // ™
        0x0161 => 154, // š
        0x203A => 155, // ›
        0x0153 => 156, // œ
        0x017E => 158, // ž
        0x0178 => 159, // Ÿ
        160..=255 => cp as u8,
        _ => b'?',
    }
}

fn windows1252_to_char(b: u8) -> char {
    if b < 128 {
        return b as char;
    }
    if b >= 160 {
        return char::from_u32(b as u32).unwrap_or('?');
    }
    match b {
        128 => '€',
        130 => '‚',
        131 => 'ƒ',
        132 => '„',
        133 => '…',
        134 => '†',
        135 => '‡',
        136 => 'ˆ',
        137 => '‰',
        138 => 'Š',
        139 => '‹',
        140 => 'Œ',
        142 => 'Ž',
        145 => '\u{2018}',
        146 => '\u{2019}',
        147 => '\u{201C}',
        148 => '\u{201D}',
        149 => '•',
        150 => '\u{2013}',
        151 => '\u{2014}',
        152 => '˜',
        153 => '™',
        154 => 'š',
        155 => '›',
        156 => 'œ',
        158 => 'ž',
        159 => 'Ÿ',
        // 129, 141, 143, 144, 157 are undefined in the codepage
        _ => '?',
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unicode_roundtrip() {
        let conv = TextUnicode;
        let text = "Hello, 世界!".to_string();
        let wire = conv.write_block(&text).unwrap();
        assert_eq!(&wire[wire.len() - 2..], &[0, 0]);
        assert_eq!(conv.read_block(&wire).unwrap(), text);
    }

    #[test]
    fn test_unicode_odd_length_rejected() {
        let conv = TextUnicode;
        assert!(matches!(
            conv.read_block(&[0x41, 0x00, 0x42]),
            Err(ClipboardError::InvalidUtf16)
        ));
    }

    #[test]
    fn test_unicode_missing_terminator_tolerated() {
        let conv = TextUnicode;
        let wire: Vec<u8> = "ok".encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        assert_eq!(conv.read_block(&wire).unwrap(), "ok");
    }

    #[test]
    fn test_ansi_roundtrip_representable() {
        let conv = TextAnsi;
        let text = "café – naïve €".to_string();
        let wire = conv.write_block(&text).unwrap();
        assert_eq!(*wire.last().unwrap(), 0);
        assert_eq!(conv.read_block(&wire).unwrap(), text);
    }

    #[test]
    fn test_ansi_unrepresentable_becomes_question_mark() {
        let conv = TextAnsi;
        let wire = conv.write_block(&"日本".to_string()).unwrap();
        assert_eq!(conv.read_block(&wire).unwrap(), "??");
    }

    #[test]
    fn test_utf8_roundtrip_and_invalid() {
        let conv = TextUtf8;
        let wire = conv.write_block(&"<b>hi</b>".to_string()).unwrap();
        assert_eq!(conv.read_block(&wire).unwrap(), "<b>hi</b>");
        assert!(matches!(
            conv.read_block(&[0xFF, 0xFE, 0xFD]),
            Err(ClipboardError::InvalidUtf8)
        ));
    }

    #[test]
    fn test_file_drop_roundtrip_wide() {
        let conv = FileDropList;
        let paths = vec![
            "C:\\Users\\demo\\report.pdf".to_string(),
            "C:\\temp\\photo.png".to_string(),
        ];
        let wire = conv.write_block(&paths).unwrap();
        // header says wide, list starts right after the header
        assert_eq!(u32::from_le_bytes([wire[0], wire[1], wire[2], wire[3]]), 20);
        assert_eq!(u32::from_le_bytes([wire[16], wire[17], wire[18], wire[19]]), 1);
        assert_eq!(conv.read_block(&wire).unwrap(), paths);
    }

    #[test]
    fn test_file_drop_ansi_read_path() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&20u32.to_le_bytes());
        wire.extend_from_slice(&[0u8; 12]);
        wire.extend_from_slice(&0u32.to_le_bytes()); // fWide = FALSE
        wire.extend_from_slice(b"C:\\a.txt\0C:\\b.txt\0\0");
        let paths = FileDropList.read_block(&wire).unwrap();
        assert_eq!(paths, vec!["C:\\a.txt".to_string(), "C:\\b.txt".to_string()]);
    }

    #[test]
    fn test_file_drop_bad_offset() {
        let mut wire = vec![0u8; 20];
        wire[0] = 200; // pFiles points past the payload
        assert!(matches!(
            FileDropList.read_block(&wire),
            Err(ClipboardError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_file_drop_stream_shapes() {
        let conv = FileDropList;
        let paths = vec!["C:\\one".to_string()];
        let mut out = Vec::new();
        conv.write_stream(&paths, &mut out).unwrap();
        let mut cursor = std::io::Cursor::new(out);
        assert_eq!(conv.read_stream(&mut cursor).unwrap(), paths);
    }

    #[test]
    fn test_windows1252_defined_range() {
        for b in 0u8..=255 {
            let c = windows1252_to_char(b);
            if !matches!(b, 129 | 141 | 143 | 144 | 157) {
                assert_eq!(char_to_windows1252(c), b, "byte {b} should round-trip");
            }
        }
    }
}
