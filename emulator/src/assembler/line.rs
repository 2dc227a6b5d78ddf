//! Source line classification.
//!
//! Each line of an assembly program is classified independently into an
//! optional label and an optional piece of content (an instruction or a
//! directive). No addresses are computed here; operands stay as raw tokens
//! and are only interpreted during encoding.
//!
//! Alias mnemonics are rewritten during classification: the named traps
//! (`GETC`, `OUT`, `PUTS`, `IN`, `PUTSP`, `HALT`) become `TRAP` with the
//! right vector, `RET` becomes `JMP R7`, and a bare `BR` branches
//! unconditionally.

use nom::{
    branch::alt,
    bytes::complete::take_while,
    character::complete::satisfy,
    combinator::{all_consuming, recognize},
    sequence::pair,
    IResult,
};

use super::AssemblyError;
use crate::runtime::Condition;

/// A classified source line.
///
/// `Default::default()` is an empty line.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct Line {
    pub label: Option<String>,
    pub content: Option<LineContent>,
}

/// The content of a non-empty line.
#[derive(Debug, PartialEq)]
pub(crate) enum LineContent {
    Instruction {
        mnemonic: Mnemonic,
        operands: Vec<String>,
    },
    Directive {
        directive: Directive,
        operands: Vec<String>,
    },
}

/// Instruction mnemonics, after alias rewriting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mnemonic {
    Add,
    And,
    Br(Condition),
    Jmp,
    Jsr,
    Jsrr,
    Ld,
    Ldi,
    Ldr,
    Lea,
    Not,
    Rti,
    St,
    Sti,
    Str,
    Trap,
}

impl Mnemonic {
    /// Canonical keyword name, used in error messages.
    pub(crate) fn name(self) -> &'static str {
        match self {
            Mnemonic::Add => "ADD",
            Mnemonic::And => "AND",
            Mnemonic::Br(_) => "BR",
            Mnemonic::Jmp => "JMP",
            Mnemonic::Jsr => "JSR",
            Mnemonic::Jsrr => "JSRR",
            Mnemonic::Ld => "LD",
            Mnemonic::Ldi => "LDI",
            Mnemonic::Ldr => "LDR",
            Mnemonic::Lea => "LEA",
            Mnemonic::Not => "NOT",
            Mnemonic::Rti => "RTI",
            Mnemonic::St => "ST",
            Mnemonic::Sti => "STI",
            Mnemonic::Str => "STR",
            Mnemonic::Trap => "TRAP",
        }
    }
}

/// Assembler directives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Directive {
    Orig,
    Fill,
    Blkw,
    Stringz,
    End,
}

impl Directive {
    /// Canonical keyword name, used in error messages.
    pub(crate) fn name(self) -> &'static str {
        match self {
            Directive::Orig => ".ORIG",
            Directive::Fill => ".FILL",
            Directive::Blkw => ".BLKW",
            Directive::Stringz => ".STRINGZ",
            Directive::End => ".END",
        }
    }
}

/// A recognized keyword token, together with any operands the alias form
/// implies.
enum Keyword {
    Instruction(Mnemonic, Vec<String>),
    Directive(Directive),
}

/// Look a token up in the keyword table. Matching is case-insensitive and
/// exact, so `JSRR` can never be mistaken for `JSR` nor `LDR` for `LD`.
fn keyword(token: &str) -> Option<Keyword> {
    use Keyword::{Directive as D, Instruction as I};

    let upper = token.to_ascii_uppercase();
    let keyword = match upper.as_str() {
        "ADD" => I(Mnemonic::Add, vec![]),
        "AND" => I(Mnemonic::And, vec![]),
        "JMP" => I(Mnemonic::Jmp, vec![]),
        "JSR" => I(Mnemonic::Jsr, vec![]),
        "JSRR" => I(Mnemonic::Jsrr, vec![]),
        "LD" => I(Mnemonic::Ld, vec![]),
        "LDI" => I(Mnemonic::Ldi, vec![]),
        "LDR" => I(Mnemonic::Ldr, vec![]),
        "LEA" => I(Mnemonic::Lea, vec![]),
        "NOT" => I(Mnemonic::Not, vec![]),
        "RTI" => I(Mnemonic::Rti, vec![]),
        "ST" => I(Mnemonic::St, vec![]),
        "STI" => I(Mnemonic::Sti, vec![]),
        "STR" => I(Mnemonic::Str, vec![]),
        "TRAP" => I(Mnemonic::Trap, vec![]),
        "RET" => I(Mnemonic::Jmp, vec!["R7".to_owned()]),
        "GETC" => I(Mnemonic::Trap, vec!["x20".to_owned()]),
        "OUT" => I(Mnemonic::Trap, vec!["x21".to_owned()]),
        "PUTS" => I(Mnemonic::Trap, vec!["x22".to_owned()]),
        "IN" => I(Mnemonic::Trap, vec!["x23".to_owned()]),
        "PUTSP" => I(Mnemonic::Trap, vec!["x24".to_owned()]),
        "HALT" => I(Mnemonic::Trap, vec!["x25".to_owned()]),
        ".ORIG" => D(Directive::Orig),
        ".FILL" => D(Directive::Fill),
        ".BLKW" => D(Directive::Blkw),
        ".STRINGZ" => D(Directive::Stringz),
        ".END" => D(Directive::End),
        _ => return branch_keyword(&upper),
    };
    Some(keyword)
}

/// Match the `BR` family: `BR` optionally followed by up to three of the
/// `n`, `z` and `p` condition letters. A bare `BR` branches always.
fn branch_keyword(upper: &str) -> Option<Keyword> {
    let flags = upper.strip_prefix("BR")?;
    if flags.len() > 3 {
        return None;
    }

    let mut condition = Condition::empty();
    for c in flags.chars() {
        condition |= match c {
            'N' => Condition::N,
            'Z' => Condition::Z,
            'P' => Condition::P,
            _ => return None,
        };
    }

    if condition.is_empty() {
        condition = Condition::all();
    }

    Some(Keyword::Instruction(Mnemonic::Br(condition), vec![]))
}

/// Parse a label identifier: a letter or underscore, then letters, digits
/// and underscores.
fn parse_identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))(input)
}

/// Validate a label token, stripping the optional trailing colon.
fn label(token: &str) -> Result<String, AssemblyError> {
    let token = token.strip_suffix(':').unwrap_or(token);
    all_consuming(parse_identifier)(token)
        .map(|(_, identifier)| identifier.to_owned())
        .map_err(|_: nom::Err<nom::error::Error<&str>>| {
            AssemblyError::Classification(token.to_owned())
        })
}

/// Split off an end-of-line comment: everything from the first semicolon
/// that is not inside a double-quoted string.
fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, c) in line.char_indices() {
        match c {
            '"' => in_string = !in_string,
            ';' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

/// `.STRINGZ` lines are classified on their own because the quoted payload
/// may contain whitespace, commas and semicolons.
///
/// Returns `Ok(None)` when the line is not a `.STRINGZ` line.
fn classify_stringz(code: &str) -> Result<Option<Line>, AssemblyError> {
    let Some(index) = code.to_ascii_uppercase().find(".STRINGZ") else {
        return Ok(None);
    };

    let head = code[..index].trim();
    let label = if head.is_empty() {
        None
    } else {
        Some(label(head)?)
    };

    let payload = code[index + ".STRINGZ".len()..].trim();
    let (_, string) = all_consuming(parse_string_literal)(payload).map_err(
        |_: nom::Err<nom::error::Error<&str>>| AssemblyError::InvalidDirective(payload.to_owned()),
    )?;

    Ok(Some(Line {
        label,
        content: Some(LineContent::Directive {
            directive: Directive::Stringz,
            operands: vec![string],
        }),
    }))
}

/// Parse a quoted string literal, single or double quoted.
fn parse_string_literal(input: &str) -> IResult<&str, String> {
    fn quoted(quote: char) -> impl Fn(&str) -> IResult<&str, String> {
        move |input: &str| {
            let (input, _) = satisfy(|c| c == quote)(input)?;
            let (input, string) = take_while(|c| c != quote)(input)?;
            let (input, _) = satisfy(|c| c == quote)(input)?;
            Ok((input, string.to_owned()))
        }
    }

    alt((quoted('"'), quoted('\'')))(input)
}

fn build(
    label: Option<String>,
    keyword: Keyword,
    rest: &[&str],
) -> Result<Line, AssemblyError> {
    let content = match keyword {
        Keyword::Instruction(mnemonic, mut operands) => {
            operands.extend(rest.iter().map(|&token| token.to_owned()));
            LineContent::Instruction { mnemonic, operands }
        }
        Keyword::Directive(directive) => LineContent::Directive {
            directive,
            operands: rest.iter().map(|&token| token.to_owned()).collect(),
        },
    };

    Ok(Line {
        label,
        content: Some(content),
    })
}

/// Classify a single source line.
pub(crate) fn classify(raw: &str) -> Result<Line, AssemblyError> {
    let code = strip_comment(raw).trim();
    if code.is_empty() {
        return Ok(Line::default());
    }

    if let Some(line) = classify_stringz(code)? {
        return Ok(line);
    }

    let tokens: Vec<&str> = code
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .collect();
    if tokens.is_empty() {
        return Err(AssemblyError::Classification(code.to_owned()));
    }

    match keyword(tokens[0]) {
        Some(keyword) => build(None, keyword, &tokens[1..]),
        None if tokens.len() == 1 => Ok(Line {
            label: Some(label(tokens[0])?),
            content: None,
        }),
        None => match keyword(tokens[1]) {
            Some(keyword) => build(Some(label(tokens[0])?), keyword, &tokens[2..]),
            None => Err(AssemblyError::Classification(code.to_owned())),
        },
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn instruction(mnemonic: Mnemonic, operands: &[&str]) -> Option<LineContent> {
        Some(LineContent::Instruction {
            mnemonic,
            operands: operands.iter().map(|&o| o.to_owned()).collect(),
        })
    }

    #[test]
    fn classify_empty_line_test() {
        assert_eq!(classify("").unwrap(), Line::default());
        assert_eq!(classify("   \t ").unwrap(), Line::default());
        assert_eq!(classify("; just a comment").unwrap(), Line::default());
    }

    #[test]
    fn classify_instruction_test() {
        assert_eq!(
            classify("ADD R1, R1, #1").unwrap(),
            Line {
                label: None,
                content: instruction(Mnemonic::Add, &["R1", "R1", "#1"]),
            }
        );
        // Commas are optional, case does not matter
        assert_eq!(
            classify("add r1 r1 #1").unwrap(),
            Line {
                label: None,
                content: instruction(Mnemonic::Add, &["r1", "r1", "#1"]),
            }
        );
    }

    #[test]
    fn classify_labelled_instruction_test() {
        assert_eq!(
            classify("LOOP: ADD R1, R1, #-1").unwrap(),
            Line {
                label: Some("LOOP".to_owned()),
                content: instruction(Mnemonic::Add, &["R1", "R1", "#-1"]),
            }
        );
        // The colon is optional
        assert_eq!(
            classify("LOOP BRp LOOP").unwrap(),
            Line {
                label: Some("LOOP".to_owned()),
                content: instruction(Mnemonic::Br(Condition::P), &["LOOP"]),
            }
        );
    }

    #[test]
    fn classify_label_only_test() {
        assert_eq!(
            classify("done:").unwrap(),
            Line {
                label: Some("done".to_owned()),
                content: None,
            }
        );
    }

    #[test]
    fn classify_branch_flags_test() {
        assert_eq!(
            classify("BR next").unwrap().content,
            instruction(Mnemonic::Br(Condition::all()), &["next"]),
        );
        assert_eq!(
            classify("BRnzp next").unwrap().content,
            instruction(Mnemonic::Br(Condition::all()), &["next"]),
        );
        assert_eq!(
            classify("brZP next").unwrap().content,
            instruction(Mnemonic::Br(Condition::Z | Condition::P), &["next"]),
        );
    }

    #[test]
    fn classify_aliases_test() {
        assert_eq!(
            classify("GETC").unwrap().content,
            instruction(Mnemonic::Trap, &["x20"]),
        );
        assert_eq!(
            classify("HALT").unwrap().content,
            instruction(Mnemonic::Trap, &["x25"]),
        );
        assert_eq!(
            classify("RET").unwrap().content,
            instruction(Mnemonic::Jmp, &["R7"]),
        );
    }

    #[test]
    fn classify_longest_match_test() {
        // JSRR and the LD/ST families must not fall into their shorter
        // prefixes
        assert_eq!(
            classify("JSRR R2").unwrap().content,
            instruction(Mnemonic::Jsrr, &["R2"]),
        );
        assert_eq!(
            classify("LDR R1, R2, #0").unwrap().content,
            instruction(Mnemonic::Ldr, &["R1", "R2", "#0"]),
        );
        assert_eq!(
            classify("STI R1, ptr").unwrap().content,
            instruction(Mnemonic::Sti, &["R1", "ptr"]),
        );
    }

    #[test]
    fn classify_directive_test() {
        assert_eq!(
            classify(".ORIG x3000").unwrap().content,
            Some(LineContent::Directive {
                directive: Directive::Orig,
                operands: vec!["x3000".to_owned()],
            }),
        );
        assert_eq!(
            classify(".END").unwrap().content,
            Some(LineContent::Directive {
                directive: Directive::End,
                operands: vec![],
            }),
        );
    }

    #[test]
    fn classify_stringz_test() {
        assert_eq!(
            classify(r#"msg .STRINGZ "hello, world""#).unwrap(),
            Line {
                label: Some("msg".to_owned()),
                content: Some(LineContent::Directive {
                    directive: Directive::Stringz,
                    operands: vec!["hello, world".to_owned()],
                }),
            }
        );
        // Semicolons inside the string are not comments
        assert_eq!(
            classify(r#".STRINGZ "a;b" ; trailing comment"#).unwrap().content,
            Some(LineContent::Directive {
                directive: Directive::Stringz,
                operands: vec!["a;b".to_owned()],
            }),
        );
        assert!(matches!(
            classify(".STRINGZ unquoted"),
            Err(AssemblyError::InvalidDirective(_))
        ));
    }

    #[test]
    fn classify_comment_test() {
        assert_eq!(
            classify("ADD R0, R0, #1 ; increment").unwrap().content,
            instruction(Mnemonic::Add, &["R0", "R0", "#1"]),
        );
    }

    #[test]
    fn classify_error_test() {
        assert!(matches!(
            classify("FROB R1, R2"),
            Err(AssemblyError::Classification(_))
        ));
        // A lone numeric token is not a valid label
        assert!(matches!(
            classify("#5"),
            Err(AssemblyError::Classification(_))
        ));
    }
}
