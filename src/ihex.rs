//! Intel-HEX codec
//!
//! Converts between a sparse memory image and the Intel-HEX text format. The
//! image is addressed from offset 0 and unwritten regions read as `0xFF`, the
//! erased-flash convention; encoding omits blocks that are entirely `0xFF`.

use crate::error::CodecError;

/// Record types understood by the decoder.
const RECORD_DATA: u8 = 0x00;
const RECORD_EOF: u8 = 0x01;
const RECORD_ORIGIN: u8 = 0x03;

/// Decode an Intel-HEX file into a flat memory image.
///
/// Gaps between data records and everything below an origin record read as
/// `0xFF`. Decoding stops at the first end-of-file record; a file without one
/// is rejected as truncated.
pub fn decode(text: &str) -> Result<Vec<u8>, CodecError> {
    let mut image: Vec<u8> = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let number = index + 1;

        let record = decode_record(line, number)?;
        let payload_len = record[0] as usize;
        if record.len() != payload_len + 5 {
            return Err(CodecError::LengthMismatch {
                line: number,
                declared: payload_len,
                got: record.len().saturating_sub(5),
            });
        }

        let sum = record.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
        if sum != 0 {
            return Err(CodecError::BadChecksum { line: number });
        }

        let address = u16::from_be_bytes([record[1], record[2]]) as usize;
        let kind = record[3];
        let payload = &record[4..4 + payload_len];

        match kind {
            RECORD_DATA => {
                grow_to(&mut image, address + payload_len);
                image[address..address + payload_len].copy_from_slice(payload);
            }
            RECORD_EOF => return Ok(image),
            RECORD_ORIGIN => {
                if payload_len != 4 {
                    return Err(CodecError::BadOrigin {
                        line: number,
                        got: payload_len,
                    });
                }
                // Everything below the origin is erased, no matter whether the
                // data records came before or after this one.
                let origin =
                    u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
                grow_to(&mut image, origin);
                image[..origin].fill(0xff);
            }
            other => {
                return Err(CodecError::UnknownRecordType {
                    line: number,
                    kind: other,
                })
            }
        }
    }

    Err(CodecError::Truncated)
}

/// Encode a memory image as Intel-HEX text.
///
/// The image length must be a multiple of 16; callers pad with `0xFF`
/// beforehand. Blocks that are entirely `0xFF` are skipped. Record addresses
/// are 16 bits wide, so images past 64 KiB are rejected.
pub fn encode(image: &[u8]) -> Result<String, CodecError> {
    debug_assert!(image.len() % 16 == 0, "image must be padded to 16 bytes");

    if image.len() > u16::MAX as usize + 1 {
        return Err(CodecError::ImageTooLarge { len: image.len() });
    }

    let mut text = String::new();

    for (block, payload) in image.chunks(16).enumerate() {
        if payload.iter().all(|b| *b == 0xff) {
            continue;
        }

        let address = (block * 16) as u16;
        let mut sum = 0x10u8
            .wrapping_add(address.to_be_bytes()[0])
            .wrapping_add(address.to_be_bytes()[1]);

        text.push_str(&format!(":10{address:04X}00"));
        for byte in payload {
            text.push_str(&format!("{byte:02X}"));
            sum = sum.wrapping_add(*byte);
        }
        text.push_str(&format!("{:02X}\n", sum.wrapping_neg()));
    }

    text.push_str(":00000001FF\n");
    Ok(text)
}

/// Hex-decode one record line, without interpreting it.
fn decode_record(line: &str, number: usize) -> Result<Vec<u8>, CodecError> {
    let malformed = CodecError::MalformedRecord { line: number };

    if !line.starts_with(':') || line.len() < 11 || line.len() % 2 != 1 {
        return Err(malformed);
    }

    let digits = &line[1..];
    let mut record = Vec::with_capacity(digits.len() / 2);
    for pair in digits.as_bytes().chunks(2) {
        let pair = std::str::from_utf8(pair).map_err(|_| CodecError::MalformedRecord {
            line: number,
        })?;
        let byte =
            u8::from_str_radix(pair, 16).map_err(|_| CodecError::MalformedRecord { line: number })?;
        record.push(byte);
    }

    Ok(record)
}

fn grow_to(image: &mut Vec<u8>, len: usize) {
    if image.len() < len {
        image.resize(len, 0xff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_single_data_record() {
        let image = decode(":0400000001020304F2\n:00000001FF\n").unwrap();
        assert_eq!(image, &[0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn decode_fills_gaps_with_erased_bytes() {
        let image = decode(":02000400AABB95\n:00000001FF\n").unwrap();
        assert_eq!(image, &[0xff, 0xff, 0xff, 0xff, 0xaa, 0xbb]);
    }

    #[test]
    fn decode_accepts_crlf_line_endings() {
        let image = decode(":0100000042BD\r\n:00000001FF\r\n").unwrap();
        assert_eq!(image, &[0x42]);
    }

    #[test]
    fn decode_rejects_bad_checksum() {
        let err = decode(":0400000001020304F3\n:00000001FF\n").unwrap_err();
        assert!(matches!(err, CodecError::BadChecksum { line: 1 }));
    }

    #[test]
    fn decode_rejects_length_mismatch() {
        // Declares 5 payload bytes but carries 4.
        let err = decode(":0500000001020304F1\n").unwrap_err();
        assert!(matches!(err, CodecError::LengthMismatch { line: 1, .. }));
    }

    #[test]
    fn decode_rejects_unknown_record_type() {
        let err = decode(":00000005FB\n").unwrap_err();
        assert!(matches!(
            err,
            CodecError::UnknownRecordType { line: 1, kind: 5 }
        ));
    }

    #[test]
    fn decode_rejects_missing_eof() {
        let err = decode(":0400000001020304F2\n").unwrap_err();
        assert!(matches!(err, CodecError::Truncated));
    }

    #[test]
    fn decode_rejects_garbage_lines() {
        assert!(matches!(
            decode("hello\n").unwrap_err(),
            CodecError::MalformedRecord { line: 1 }
        ));
        assert!(matches!(
            // Even length after the colon marker.
            decode(":000000001FF\n").unwrap_err(),
            CodecError::MalformedRecord { line: 1 }
        ));
    }

    #[test]
    fn origin_before_data_erases_prefix() {
        // org 4, then data at 4..6
        let image = decode(":0400000300000004F5\n:02000400AABB95\n:00000001FF\n").unwrap();
        assert_eq!(image, &[0xff, 0xff, 0xff, 0xff, 0xaa, 0xbb]);
    }

    #[test]
    fn origin_after_data_erases_already_decoded_bytes() {
        // Data at 0..4, then org 4: the prefix is erased either way.
        let image = decode(":0400000001020304F2\n:0400000300000004F5\n:00000001FF\n").unwrap();
        assert_eq!(image, &[0xff, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn origin_with_wrong_payload_size_is_rejected() {
        let err = decode(":02000003000AF1\n").unwrap_err();
        assert!(matches!(err, CodecError::BadOrigin { line: 1, got: 2 }));
    }

    #[test]
    fn encode_skips_erased_blocks() {
        let mut image = vec![0xff; 48];
        image[16] = 0x01;
        image[17] = 0x02;

        let text = encode(&image).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with(":100010000102"));
        assert_eq!(lines[1], ":00000001FF");
    }

    #[test]
    fn encode_of_fully_erased_image_is_just_eof() {
        assert_eq!(encode(&[0xff; 32]).unwrap(), ":00000001FF\n");
    }

    #[test]
    fn encode_addresses_up_to_the_last_16_bit_block() {
        let mut image = vec![0xff; 64 * 1024];
        image[0xfff0] = 0x42;

        let text = encode(&image).unwrap();
        assert!(text.starts_with(":10FFF000"));
    }

    #[test]
    fn encode_rejects_images_past_64_kib() {
        let err = encode(&vec![0x00; 64 * 1024 + 16]).unwrap_err();
        assert!(matches!(err, CodecError::ImageTooLarge { len: 65552 }));
    }

    #[test]
    fn roundtrip_preserves_16_byte_multiple_images() {
        // Erased blocks in the middle are omitted on the wire but re-created
        // as gap fill when the block behind them is decoded.
        let mut image: Vec<u8> = (0u16..256).map(|b| b as u8).collect();
        image.extend_from_slice(&[0xff; 32]);
        image.extend_from_slice(&[0x55; 16]);

        assert_eq!(decode(&encode(&image).unwrap()).unwrap(), image);
    }

    #[test]
    fn roundtrip_pads_back_trailing_erased_blocks() {
        // A trailing erased block is not represented on the wire at all; the
        // programming path pads images back out with 0xFF before comparing.
        let mut image = vec![0x42; 16];
        image.extend_from_slice(&[0xff; 16]);

        let mut decoded = decode(&encode(&image).unwrap()).unwrap();
        assert_eq!(decoded.len(), 16);
        decoded.resize(image.len(), 0xff);
        assert_eq!(decoded, image);
    }

    #[test]
    fn roundtrip_of_dense_image_is_exact() {
        let image: Vec<u8> = (0u16..160).map(|b| (b as u8) ^ 0xa5).collect();
        assert_eq!(decode(&encode(&image).unwrap()).unwrap(), image);
    }
}
