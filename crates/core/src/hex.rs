//! Intel HEX parser.
//!
//! Parses Intel HEX text (`:LLAAAATT[DD...]CC`) into a byte image of program
//! memory. Supports record types 00 (data), 01 (EOF), 02 (extended segment
//! address) and 04 (extended linear address); start-address records 03 and
//! 05 are ignored. Bytes pair up little-endian into instruction words.

use crate::error::HexError;
use crate::PROGRAM_WORDS;

const IMAGE_LIMIT: usize = PROGRAM_WORDS * 2;

/// Parse Intel HEX text into a byte image.
///
/// The image is as long as the highest address written; gaps are zero.
pub fn parse_hex(hex: &str) -> Result<Vec<u8>, HexError> {
    let mut image = Vec::new();
    let mut base_addr: usize = 0;

    for (n, line) in hex.lines().enumerate() {
        let line_no = n + 1;
        let line = line.trim();
        if !line.starts_with(':') {
            continue; // blank lines and comments
        }

        let bytes = hex_line_to_bytes(&line[1..]).map_err(|message| HexError::Syntax { line: line_no, message })?;
        if bytes.len() < 5 {
            return Err(HexError::Syntax { line: line_no, message: "record too short".into() });
        }

        let byte_count = bytes[0] as usize;
        if bytes.len() != byte_count + 5 {
            return Err(HexError::Syntax {
                line: line_no,
                message: format!("length byte says {} data bytes, record has {}", byte_count, bytes.len() - 5),
            });
        }
        let addr = ((bytes[1] as usize) << 8) | bytes[2] as usize;
        let record_type = bytes[3];
        let data = &bytes[4..4 + byte_count];

        let sum: u8 = bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        if sum != 0 {
            return Err(HexError::Checksum { line: line_no, sum });
        }

        match record_type {
            0x00 => {
                let start = base_addr + addr;
                let end = start + byte_count;
                if end > IMAGE_LIMIT {
                    return Err(HexError::TooLarge(end));
                }
                if image.len() < end {
                    image.resize(end, 0);
                }
                image[start..end].copy_from_slice(data);
            }
            0x01 => break,
            0x02 if byte_count >= 2 => {
                base_addr = (((data[0] as usize) << 8) | data[1] as usize) << 4;
            }
            0x04 if byte_count >= 2 => {
                base_addr = (((data[0] as usize) << 8) | data[1] as usize) << 16;
            }
            0x02 | 0x04 => {
                return Err(HexError::Syntax {
                    line: line_no,
                    message: format!("address record type {:02X} needs 2 data bytes, has {}", record_type, byte_count),
                });
            }
            0x03 | 0x05 => {}
            other => {
                return Err(HexError::Syntax { line: line_no, message: format!("unknown record type {:02X}", other) });
            }
        }
    }

    Ok(image)
}

/// Pair bytes little-endian into words; an odd trailing byte is padded.
pub fn to_words(image: &[u8]) -> Vec<u16> {
    image
        .chunks(2)
        .map(|c| u16::from_le_bytes([c[0], c.get(1).copied().unwrap_or(0)]))
        .collect()
}

/// Convert hex character pairs to bytes
fn hex_line_to_bytes(hex_str: &str) -> Result<Vec<u8>, String> {
    let chars: Vec<char> = hex_str.chars().collect();
    if chars.len() % 2 != 0 {
        return Err("odd number of hex characters".into());
    }
    chars
        .chunks(2)
        .map(|pair| Ok((hex_char(pair[0])? << 4) | hex_char(pair[1])?))
        .collect()
}

fn hex_char(c: char) -> Result<u8, String> {
    c.to_digit(16)
        .map(|d| d as u8)
        .ok_or_else(|| format!("invalid hex character {:?}", c))
}
