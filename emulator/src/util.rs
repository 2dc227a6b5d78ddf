//! Bit-twiddling helpers shared by the assembler and the runtime.

use crate::constants::Word;

/// Truncate a value to its `width` low bits.
///
/// This is how immediates and offsets are committed into instruction words:
/// negative values end up in two's complement form in the field.
pub(crate) fn fit(value: i32, width: u32) -> Word {
    let mask = (1u32 << width) - 1;
    ((value as u32) & mask) as Word
}

/// Interpret the `width` low bits of a word as a signed two's complement
/// quantity.
pub(crate) fn sext(word: Word, width: u32) -> i16 {
    let mask = (1u32 << width) - 1;
    let value = u32::from(word) & mask;
    if value & (1 << (width - 1)) == 0 {
        value as i16
    } else {
        (value as i32 - (1i32 << width)) as i16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_test() {
        assert_eq!(fit(15, 5), 0b01111);
        assert_eq!(fit(-16, 5), 0b10000);
        assert_eq!(fit(-1, 5), 0b11111);
        assert_eq!(fit(-1, 9), 0x1FF);
        assert_eq!(fit(0x3000, 16), 0x3000);
        assert_eq!(fit(-2, 16), 0xFFFE);
    }

    #[test]
    fn sext_test() {
        assert_eq!(sext(0b01111, 5), 15);
        assert_eq!(sext(0b10000, 5), -16);
        assert_eq!(sext(0b11111, 5), -1);
        assert_eq!(sext(0x1FF, 9), -1);
        assert_eq!(sext(0x0FF, 9), 255);
        assert_eq!(sext(0xFFFF, 16), -1);
    }

    #[test]
    fn fit_sext_round_trip() {
        for value in -16..=15 {
            assert_eq!(sext(fit(value, 5), 5), value as i16);
        }
        for value in -256..=255 {
            assert_eq!(sext(fit(value, 9), 9), value as i16);
        }
    }
}
