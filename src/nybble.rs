//! # Nybble Codec
//!
//! The WS23xx console addresses its memory four bits at a time. A buffer read
//! from the device packs two nybbles per byte, the even nybble in the low half
//! and the odd nybble in the high half:
//!
//! ```text
//! byte:     0x21      0x43
//! nybble:   [0]=1 [1]=2 [2]=3 [3]=4
//! ```
//!
//! Multi-digit numbers are stored least-significant nybble first, either as
//! binary-coded decimal (each nybble 0-9) or as plain hexadecimal.
//!
//! Every function here checks the requested nybble range against the slice it
//! was given and reports a [`NybbleError`] instead of reading past the end.

use thiserror::Error;

/// Errors raised while encoding or decoding nybble-packed numbers.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NybbleError {
    /// A nybble is not a digit of the requested base (e.g. 0xA in BCD)
    #[error("nybble {digit:#x} is not a base-{base} digit")]
    InvalidDigit { digit: u8, base: u32 },

    /// The value needs more digits than the field provides
    #[error("value {value} does not fit in {width} base-{base} nybbles")]
    Overflow { value: u64, width: usize, base: u32 },

    /// The nybble range extends past the end of the buffer
    #[error("nybble {index} is outside a {len}-nybble buffer")]
    OutOfBounds { index: usize, len: usize },
}

/// Digit base of a nybble-encoded number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Radix {
    /// Binary-coded decimal, one decimal digit per nybble
    Decimal,
    /// Hexadecimal, every nybble value is a digit
    Hex,
}

impl Radix {
    pub const fn base(self) -> u32 {
        match self {
            Radix::Decimal => 10,
            Radix::Hex => 16,
        }
    }
}

/// Number of bytes needed to hold `nybbles` nybbles.
pub const fn byte_len(nybbles: usize) -> usize {
    (nybbles + 1) / 2
}

fn check_range(buf: &[u8], offset: usize, width: usize) -> Result<(), NybbleError> {
    let len = buf.len() * 2;
    match offset.checked_add(width) {
        Some(end) if end <= len => Ok(()),
        _ => Err(NybbleError::OutOfBounds {
            index: offset.saturating_add(width).saturating_sub(1),
            len,
        }),
    }
}

/// Extract nybble `index` (0-15).
pub fn nybble_at(buf: &[u8], index: usize) -> Result<u8, NybbleError> {
    let byte = buf.get(index / 2).ok_or(NybbleError::OutOfBounds {
        index,
        len: buf.len() * 2,
    })?;

    Ok(if index & 1 == 1 { byte >> 4 } else { byte & 0x0F })
}

/// Store `value` into nybble `index`, leaving the other half of the byte intact.
pub fn set_nybble(buf: &mut [u8], index: usize, value: u8) -> Result<(), NybbleError> {
    if value > 0x0F {
        return Err(NybbleError::InvalidDigit {
            digit: value,
            base: 16,
        });
    }

    let len = buf.len() * 2;
    let byte = buf
        .get_mut(index / 2)
        .ok_or(NybbleError::OutOfBounds { index, len })?;

    if index & 1 == 1 {
        *byte = (value << 4) | (*byte & 0x0F);
    } else {
        *byte = value | (*byte & 0xF0);
    }

    Ok(())
}

/// Decode `width` nybbles starting at `offset` as an unsigned integer.
pub fn to_int(buf: &[u8], width: usize, offset: usize, radix: Radix) -> Result<u64, NybbleError> {
    check_range(buf, offset, width)?;

    let base = radix.base();
    let mut value: u64 = 0;

    for i in (0..width).rev() {
        let digit = nybble_at(buf, offset + i)?;
        if u32::from(digit) >= base {
            return Err(NybbleError::InvalidDigit { digit, base });
        }

        value = value
            .checked_mul(u64::from(base))
            .and_then(|v| v.checked_add(u64::from(digit)))
            .ok_or(NybbleError::Overflow { value, width, base })?;
    }

    Ok(value)
}

/// Decode a binary-coded decimal number.
pub fn bcd_to_int(buf: &[u8], width: usize, offset: usize) -> Result<u64, NybbleError> {
    to_int(buf, width, offset, Radix::Decimal)
}

/// Decode a hexadecimal number.
pub fn hex_to_int(buf: &[u8], width: usize, offset: usize) -> Result<u64, NybbleError> {
    to_int(buf, width, offset, Radix::Hex)
}

/// Encode `value` into `width` nybbles at `offset`, least-significant first.
///
/// Fails with [`NybbleError::Overflow`] before touching the buffer if the
/// value needs more than `width` digits.
pub fn int_to_nybbles(
    value: u64,
    width: usize,
    offset: usize,
    radix: Radix,
    buf: &mut [u8],
) -> Result<(), NybbleError> {
    check_range(buf, offset, width)?;

    let base = u64::from(radix.base());
    let limit = u32::try_from(width).ok().and_then(|w| base.checked_pow(w));
    if let Some(limit) = limit {
        if value >= limit {
            return Err(NybbleError::Overflow {
                value,
                width,
                base: radix.base(),
            });
        }
    }

    let mut rest = value;
    for i in 0..width {
        set_nybble(buf, offset + i, (rest % base) as u8)?;
        rest /= base;
    }

    Ok(())
}

/// Copy `width` nybbles starting at `src_offset` of `src` into `dest`,
/// starting at nybble 0.
///
/// Even offsets are a plain byte copy. Odd offsets rebuild each destination
/// byte from the high half of one source byte and the low half of the next.
/// When `width` is odd and the offset is odd, the unused high nybble of the
/// last destination byte is zeroed.
pub fn copy_nybbles(
    dest: &mut [u8],
    src: &[u8],
    width: usize,
    src_offset: usize,
) -> Result<(), NybbleError> {
    check_range(src, src_offset, width)?;

    let nbytes = byte_len(width);
    if dest.len() < nbytes {
        return Err(NybbleError::OutOfBounds {
            index: width - 1,
            len: dest.len() * 2,
        });
    }

    let start = src_offset / 2;

    if src_offset & 1 == 0 {
        dest[..nbytes].copy_from_slice(&src[start..start + nbytes]);
    } else {
        for k in 0..nbytes {
            let low = src[start + k] >> 4;
            let high = if 2 * k + 1 < width {
                src[start + k + 1] & 0x0F
            } else {
                0
            };
            dest[k] = low | (high << 4);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nybble_order_within_byte() {
        let buf = [0x21, 0x43];
        let nybbles: Vec<u8> = (0..4).map(|i| nybble_at(&buf, i).unwrap()).collect();
        assert_eq!(nybbles, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_set_then_get_every_index() {
        let mut buf = [0xA5u8; 4];
        for index in 0..8 {
            for value in 0..16u8 {
                set_nybble(&mut buf, index, value).unwrap();
                assert_eq!(nybble_at(&buf, index).unwrap(), value);
            }
        }
    }

    #[test]
    fn test_set_preserves_neighbour() {
        let mut buf = [0x00u8];
        set_nybble(&mut buf, 1, 0xC).unwrap();
        set_nybble(&mut buf, 0, 0x3).unwrap();
        assert_eq!(buf[0], 0xC3);
    }

    #[test]
    fn test_set_rejects_wide_value() {
        let mut buf = [0u8; 1];
        assert!(matches!(
            set_nybble(&mut buf, 0, 0x10),
            Err(NybbleError::InvalidDigit { digit: 0x10, .. })
        ));
    }

    #[test]
    fn test_out_of_bounds() {
        let buf = [0u8; 2];
        assert_eq!(
            nybble_at(&buf, 4),
            Err(NybbleError::OutOfBounds { index: 4, len: 4 })
        );
        assert!(matches!(
            bcd_to_int(&buf, 3, 2),
            Err(NybbleError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_bcd_decode() {
        // 3150 least-significant digit first: 0,5,1,3
        let buf = [0x50, 0x31];
        assert_eq!(bcd_to_int(&buf, 4, 0).unwrap(), 3150);
        assert_eq!(bcd_to_int(&buf, 2, 1).unwrap(), 15);
    }

    #[test]
    fn test_bcd_rejects_hex_digit() {
        let buf = [0x1A];
        assert_eq!(
            bcd_to_int(&buf, 2, 0),
            Err(NybbleError::InvalidDigit { digit: 0xA, base: 10 })
        );
        assert_eq!(hex_to_int(&buf, 2, 0).unwrap(), 0x1A);
    }

    #[test]
    fn test_hex_decode_at_odd_offset() {
        let buf = [0x90, 0xAB, 0x0C];
        // nybbles: 0,9,B,A,C,0 -> from 1, width 3: 9,B,A -> 0xAB9
        assert_eq!(hex_to_int(&buf, 3, 1).unwrap(), 0xAB9);
    }

    #[test]
    fn test_encode_then_decode_both_bases() {
        let cases = [
            (Radix::Decimal, 4, 3150u64),
            (Radix::Decimal, 6, 999_999),
            (Radix::Decimal, 1, 0),
            (Radix::Hex, 3, 0xFFF),
            (Radix::Hex, 5, 0x1_2345),
            (Radix::Hex, 2, 0x0E),
        ];

        for (radix, width, value) in cases {
            for offset in 0..3 {
                let mut buf = [0u8; 8];
                int_to_nybbles(value, width, offset, radix, &mut buf).unwrap();
                assert_eq!(
                    to_int(&buf, width, offset, radix).unwrap(),
                    value,
                    "{radix:?} width {width} offset {offset}"
                );
            }
        }
    }

    #[test]
    fn test_encode_overflow_leaves_buffer_untouched() {
        let mut buf = [0x77u8; 2];
        assert_eq!(
            int_to_nybbles(100, 2, 0, Radix::Decimal, &mut buf),
            Err(NybbleError::Overflow {
                value: 100,
                width: 2,
                base: 10
            })
        );
        assert_eq!(buf, [0x77, 0x77]);
        assert!(int_to_nybbles(0x100, 2, 0, Radix::Hex, &mut buf).is_err());
        assert!(int_to_nybbles(0xFF, 2, 0, Radix::Hex, &mut buf).is_ok());
    }

    #[test]
    fn test_decode_overflow_is_reported() {
        let buf = [0xFFu8; 12];
        assert!(matches!(
            hex_to_int(&buf, 17, 0),
            Err(NybbleError::Overflow { .. })
        ));
        assert_eq!(hex_to_int(&buf, 16, 0).unwrap(), u64::MAX);
    }

    #[test]
    fn test_copy_even_offset_is_byte_copy() {
        let src = [0x21, 0x43, 0x65, 0x87];
        let mut dest = [0u8; 2];
        copy_nybbles(&mut dest, &src, 4, 2).unwrap();
        assert_eq!(dest, [0x43, 0x65]);
    }

    #[test]
    fn test_copy_odd_offset_shifts() {
        let src = [0x21, 0x43];
        let mut dest = [0u8; 1];
        copy_nybbles(&mut dest, &src, 2, 1).unwrap();
        assert_eq!(nybble_at(&dest, 0).unwrap(), 2);
        assert_eq!(nybble_at(&dest, 1).unwrap(), 3);
    }

    #[test]
    fn test_copy_odd_offset_matches_source_nybbles() {
        let src = [0x21, 0x43, 0x65, 0x87, 0xA9];
        for width in 1..=7 {
            let mut dest = [0xFFu8; 4];
            copy_nybbles(&mut dest, &src, width, 3).unwrap();
            for i in 0..width {
                assert_eq!(
                    nybble_at(&dest, i).unwrap(),
                    nybble_at(&src, 3 + i).unwrap()
                );
            }
            if width % 2 == 1 {
                assert_eq!(nybble_at(&dest, width).unwrap(), 0);
            }
        }
    }

    #[test]
    fn test_copy_checks_both_buffers() {
        let src = [0x21, 0x43];
        let mut small = [0u8; 1];
        assert!(copy_nybbles(&mut small, &src, 3, 0).is_err());
        let mut dest = [0u8; 2];
        assert!(copy_nybbles(&mut dest, &src, 3, 2).is_err());
    }
}
