//! Instruction and directive encoding.
//!
//! Classified lines are turned into 16-bit machine words here. Operand
//! tokens are interpreted late: a token that parses as a number is used
//! directly, anything else is handed to the [`ImageBuilder`] as a label
//! reference.
//!
//! Numeric operands come in exactly two forms: hexadecimal with an `x` or
//! `0x` prefix, and decimal with a `#` prefix. Both accept a leading minus
//! sign.

use std::str::FromStr;

use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_while1},
    character::complete::char,
    combinator::{all_consuming, map_res, opt},
    IResult,
};

use super::image::ImageBuilder;
use super::line::{Directive, LineContent, Mnemonic};
use super::AssemblyError;
use crate::constants::Word;
use crate::runtime::Reg;
use crate::util::fit;

/// Check if character is a decimal digit
fn is_digit(c: char) -> bool {
    c.is_ascii_digit()
}

/// Check if character is a hexadecimal digit
fn is_hex_digit(c: char) -> bool {
    c.is_ascii_hexdigit()
}

/// Parse a hexadecimal operand: `x10`, `0xFFFE`, `-x2`
fn parse_hexadecimal(input: &str) -> IResult<&str, i32> {
    let (input, negative) = opt(char('-'))(input)?;
    let (input, _) = opt(char('0'))(input)?;
    let (input, _) = tag_no_case("x")(input)?;
    let (input, value) = map_res(take_while1(is_hex_digit), |digits| {
        u16::from_str_radix(digits, 16)
    })(input)?;

    let value = i32::from(value);
    Ok((input, if negative.is_some() { -value } else { value }))
}

/// Parse a decimal operand: `#5`, `#-16`
fn parse_decimal(input: &str) -> IResult<&str, i32> {
    let (input, _) = char('#')(input)?;
    let (input, negative) = opt(char('-'))(input)?;
    let (input, value) = map_res(take_while1(is_digit), i32::from_str)(input)?;
    Ok((input, if negative.is_some() { -value } else { value }))
}

/// Parse a numeric operand. `None` means the token is not a number and
/// should be treated as a label reference.
pub(crate) fn parse_number(token: &str) -> Option<i32> {
    all_consuming(alt((parse_decimal, parse_hexadecimal)))(token)
        .ok()
        .map(|(_, value)| value)
}

/// Parse a register operand: `R0` through `R7`, case-insensitive.
fn parse_register(token: &str) -> Result<Reg, AssemblyError> {
    Reg::from_str(&token.to_ascii_uppercase())
        .map_err(|_| AssemblyError::InvalidOperand(token.to_owned()))
}

/// Fetch operand `index`, failing with the keyword name when it is absent.
fn operand<'a>(
    operands: &'a [String],
    index: usize,
    keyword: &str,
) -> Result<&'a str, AssemblyError> {
    operands
        .get(index)
        .map(String::as_str)
        .ok_or_else(|| AssemblyError::MissingOperand(keyword.to_owned()))
}

fn register(operands: &[String], index: usize, keyword: &str) -> Result<Reg, AssemblyError> {
    parse_register(operand(operands, index, keyword)?)
}

/// Encode one piece of line content into the image.
pub(crate) fn encode(
    content: &LineContent,
    builder: &mut ImageBuilder,
) -> Result<(), AssemblyError> {
    match content {
        LineContent::Instruction { mnemonic, operands } => {
            encode_instruction(*mnemonic, operands, builder)
        }
        LineContent::Directive {
            directive,
            operands,
        } => encode_directive(*directive, operands, builder),
    }
}

fn encode_instruction(
    mnemonic: Mnemonic,
    operands: &[String],
    builder: &mut ImageBuilder,
) -> Result<(), AssemblyError> {
    use Mnemonic as M;

    let name = mnemonic.name();
    match mnemonic {
        M::Add | M::And => {
            let opcode: Word = if mnemonic == M::Add { 0x1000 } else { 0x5000 };
            let dr = register(operands, 0, name)?;
            let sr1 = register(operands, 1, name)?;
            let bits = opcode | dr.bits() << 9 | sr1.bits() << 6;

            // Third operand picks the mode: a register clears bit 5, an
            // immediate (or label) sets it
            let third = operand(operands, 2, name)?;
            if let Ok(sr2) = parse_register(third) {
                builder.push_word(bits | sr2.bits())
            } else {
                builder.push_immediate(bits | 0x0020, third, parse_number(third), 5)
            }
        }

        M::Not => {
            let dr = register(operands, 0, name)?;
            let sr = register(operands, 1, name)?;
            builder.push_word(0x9000 | dr.bits() << 9 | sr.bits() << 6 | 0x003F)
        }

        M::Br(condition) => {
            let target = operand(operands, 0, name)?;
            builder.push_offset(condition.bits(), target, parse_number(target), 9)
        }

        M::Jmp => {
            let base = register(operands, 0, name)?;
            builder.push_word(0xC000 | base.bits() << 6)
        }

        M::Jsr => {
            let target = operand(operands, 0, name)?;
            builder.push_offset(0x4800, target, parse_number(target), 11)
        }

        M::Jsrr => {
            let base = register(operands, 0, name)?;
            builder.push_word(0x4000 | base.bits() << 6)
        }

        M::Ld | M::Ldi | M::Lea | M::St | M::Sti => {
            let opcode: Word = match mnemonic {
                M::Ld => 0x2000,
                M::Ldi => 0xA000,
                M::Lea => 0xE000,
                M::St => 0x3000,
                _ => 0xB000,
            };
            let reg = register(operands, 0, name)?;
            let target = operand(operands, 1, name)?;
            builder.push_offset(opcode | reg.bits() << 9, target, parse_number(target), 9)
        }

        M::Ldr | M::Str => {
            let opcode: Word = if mnemonic == M::Ldr { 0x6000 } else { 0x7000 };
            let reg = register(operands, 0, name)?;
            let base = register(operands, 1, name)?;
            let target = operand(operands, 2, name)?;
            builder.push_offset(
                opcode | reg.bits() << 9 | base.bits() << 6,
                target,
                parse_number(target),
                6,
            )
        }

        M::Rti => builder.push_word(0x8000),

        M::Trap => {
            let vector = operand(operands, 0, name)?;
            builder.push_immediate(0xF000, vector, parse_number(vector), 8)
        }
    }
}

fn encode_directive(
    directive: Directive,
    operands: &[String],
    builder: &mut ImageBuilder,
) -> Result<(), AssemblyError> {
    let name = directive.name();
    match directive {
        Directive::Orig => {
            let token = operand(operands, 0, name)?;
            let value = parse_number(token)
                .ok_or_else(|| AssemblyError::InvalidOperand(token.to_owned()))?;
            builder.set_origin(fit(value, 16))
        }

        Directive::Fill => {
            let token = operand(operands, 0, name)?;
            builder.push_immediate(0, token, parse_number(token), 16)
        }

        Directive::Blkw => {
            let token = operand(operands, 0, name)?;
            // .BLKW takes a bare decimal count, but the prefixed forms work
            // too
            let count = parse_number(token)
                .or_else(|| token.parse::<i32>().ok())
                .filter(|&count| count >= 0)
                .ok_or_else(|| AssemblyError::InvalidOperand(token.to_owned()))?;
            for _ in 0..count {
                builder.push_word(0)?;
            }
            Ok(())
        }

        Directive::Stringz => {
            let string = operand(operands, 0, name)?;
            for c in string.chars() {
                builder.push_word(fit(c as i32, 16))?;
            }
            builder.push_word(0)
        }

        Directive::End => {
            builder.mark_end();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::super::line::classify;
    use super::*;

    fn assemble(source: &str) -> Result<Vec<Word>, AssemblyError> {
        let mut builder = ImageBuilder::default();
        builder.set_origin(0x3000).unwrap();
        let line = classify(source)?;
        encode(&line.content.unwrap(), &mut builder)?;
        Ok(builder.finish()?.image)
    }

    fn word(source: &str) -> Word {
        let image = assemble(source).unwrap();
        assert_eq!(image.len(), 1);
        image[0]
    }

    #[test]
    fn parse_number_test() {
        assert_eq!(parse_number("#5"), Some(5));
        assert_eq!(parse_number("#-16"), Some(-16));
        assert_eq!(parse_number("x3000"), Some(0x3000));
        assert_eq!(parse_number("0xFFFE"), Some(0xFFFE));
        assert_eq!(parse_number("-x2"), Some(-2));
        assert_eq!(parse_number("X1f"), Some(0x1F));

        // Anything else is a label reference
        assert_eq!(parse_number("5"), None);
        assert_eq!(parse_number("loop"), None);
        assert_eq!(parse_number("#5x"), None);
        assert_eq!(parse_number("x10000"), None);
        assert_eq!(parse_number(""), None);
    }

    #[test]
    fn encode_add_and_test() {
        assert_eq!(word("ADD R1, R2, R3"), 0x1283);
        assert_eq!(word("ADD R1, R2, #-5"), 0x12BB);
        assert_eq!(word("ADD R0, R0, #15"), 0x102F);
        assert_eq!(word("AND R0, R0, #0"), 0x5020);
        assert_eq!(word("AND R2, R1, R3"), 0x5443);
    }

    #[test]
    fn encode_not_test() {
        assert_eq!(word("NOT R4, R5"), 0x997F);
    }

    #[test]
    fn encode_branches_test() {
        assert_eq!(word("BRnzp #-2"), 0x0FFE);
        assert_eq!(word("BR #-2"), 0x0FFE);
        assert_eq!(word("BRz #5"), 0x0405);
        assert_eq!(word("BRp #0"), 0x0200);
    }

    #[test]
    fn encode_jumps_test() {
        assert_eq!(word("JMP R7"), 0xC1C0);
        assert_eq!(word("RET"), 0xC1C0);
        assert_eq!(word("JSR #10"), 0x480A);
        assert_eq!(word("JSRR R2"), 0x4080);
    }

    #[test]
    fn encode_loads_stores_test() {
        assert_eq!(word("LD R0, #5"), 0x2005);
        assert_eq!(word("LDI R5, #3"), 0xAA03);
        assert_eq!(word("LDR R1, R2, #-1"), 0x62BF);
        assert_eq!(word("LEA R0, #2"), 0xE002);
        assert_eq!(word("ST R2, #-3"), 0x35FD);
        assert_eq!(word("STI R1, #0"), 0xB200);
        assert_eq!(word("STR R3, R4, #1"), 0x7701);
    }

    #[test]
    fn encode_traps_test() {
        assert_eq!(word("TRAP x25"), 0xF025);
        assert_eq!(word("HALT"), 0xF025);
        assert_eq!(word("GETC"), 0xF020);
        assert_eq!(word("PUTS"), 0xF022);
        assert_eq!(word("RTI"), 0x8000);
    }

    #[test]
    fn encode_directives_test() {
        assert_eq!(word(".FILL x13"), 0x0013);
        assert_eq!(word(".FILL #-1"), 0xFFFF);
        assert_eq!(assemble(".BLKW 3").unwrap(), vec![0, 0, 0]);
        assert_eq!(assemble(".BLKW 0").unwrap(), vec![]);
        assert_eq!(
            assemble(r#".STRINGZ "hi""#).unwrap(),
            vec![u16::from(b'h'), u16::from(b'i'), 0]
        );
    }

    #[test]
    fn encode_invalid_register_test() {
        assert_eq!(
            assemble("NOT R8, R0").unwrap_err(),
            AssemblyError::InvalidOperand("R8".to_owned())
        );
        assert_eq!(
            assemble("JMP loop").unwrap_err(),
            AssemblyError::InvalidOperand("loop".to_owned())
        );
    }

    #[test]
    fn encode_missing_operand_test() {
        assert_eq!(
            assemble("ADD R1, R1").unwrap_err(),
            AssemblyError::MissingOperand("ADD".to_owned())
        );
        assert_eq!(
            assemble("TRAP").unwrap_err(),
            AssemblyError::MissingOperand("TRAP".to_owned())
        );
    }
}
