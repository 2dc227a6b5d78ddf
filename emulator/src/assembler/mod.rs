//! The LC-3 assembler.
//!
//! Assembly is a single pass over the source: each line is
//! [classified][line], labels are recorded in the symbol table as they
//! appear, and [encoded][encode] words are appended to the
//! [image][image]. References to labels that are not defined yet are
//! backpatched when the definition shows up, so the pass never has to look
//! ahead.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, info};

mod encode;
mod image;
mod line;

use image::ImageBuilder;

use crate::constants::Word;

/// Errors produced while assembling a single line or finishing the image.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssemblyError {
    /// A word was emitted before `.ORIG`, or a label was defined before the
    /// origin was known
    #[error("no .ORIG directive seen yet")]
    OriginNotSet,

    /// More than one `.ORIG`
    #[error(".ORIG was already set")]
    OriginRedefined,

    /// A word was emitted after `.END`
    #[error("content after .END")]
    AfterEnd,

    /// No keyword could be determined for a non-empty line
    #[error("could not determine keyword in {0:?}")]
    Classification(String),

    /// An operand token that had to be a register or a number was neither
    #[error("invalid operand {0:?}")]
    InvalidOperand(String),

    /// A keyword was missing a required operand
    #[error("missing operand for {0}")]
    MissingOperand(String),

    /// A directive had a malformed argument, e.g. an unquoted `.STRINGZ`
    #[error("invalid directive argument {0:?}")]
    InvalidDirective(String),

    /// Labels referenced but never defined
    #[error("unresolved labels: {0:?}")]
    UnresolvedLabels(Vec<String>),
}

/// An assembly failure, with the 1-based source line when it is tied to
/// one.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error("line {line}: {source}")]
    Line { line: usize, source: AssemblyError },

    #[error(transparent)]
    Assembly(#[from] AssemblyError),
}

impl CompileError {
    pub fn kind(&self) -> &AssemblyError {
        match self {
            CompileError::Line { source, .. } => source,
            CompileError::Assembly(source) => source,
        }
    }

    pub fn line(&self) -> Option<usize> {
        match self {
            CompileError::Line { line, .. } => Some(*line),
            CompileError::Assembly(_) => None,
        }
    }
}

/// An assembled program, ready to be loaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    /// Load address of the first word of the image
    pub origin: Word,
    /// The machine words, in address order
    pub image: Vec<Word>,
    /// Label addresses by name
    pub symbols: HashMap<String, Word>,
}

/// Assemble a program from its source lines.
///
/// The whole source is processed even though the origin, image and symbols
/// are built incrementally: the first error aborts the pass.
pub fn compile<S: AsRef<str>>(lines: &[S]) -> Result<Program, CompileError> {
    let mut builder = ImageBuilder::default();

    for (index, raw) in lines.iter().enumerate() {
        let number = index + 1;
        let at_line = |source| CompileError::Line {
            line: number,
            source,
        };

        let line = line::classify(raw.as_ref()).map_err(at_line)?;
        debug!(number, ?line, "classified");

        if let Some(label) = &line.label {
            builder
                .define_label(label, line.content.is_none())
                .map_err(at_line)?;
        }

        if let Some(content) = &line.content {
            encode::encode(content, &mut builder).map_err(at_line)?;
        }
    }

    let program = builder.finish()?;
    info!(
        origin = format_args!("{:#06x}", program.origin),
        words = program.image.len(),
        symbols = program.symbols.len(),
        "assembled program"
    );
    Ok(program)
}

/// Assemble a program from a whole source file.
pub fn compile_source(source: &str) -> Result<Program, CompileError> {
    let lines: Vec<&str> = source.lines().collect();
    compile(&lines)
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn compile_loop_test() {
        let program = compile_source(indoc! {"
            .ORIG x3000
            AND R1, R1, #0
            ADD R1, R1, #3
            LOOP
            ADD R1, R1, #-1
            BRp LOOP
            HALT
            .END
        "})
        .unwrap();

        assert_eq!(program.origin, 0x3000);
        assert_eq!(
            program.image,
            vec![0x5260, 0x1263, 0x127F, 0x03FE, 0xF025]
        );
        assert_eq!(program.symbols["LOOP"], 0x3002);
    }

    #[test]
    fn compile_forward_reference_test() {
        let program = compile_source(indoc! {"
            .ORIG x3000
            LD R0, value
            HALT
            value
            .FILL x13
            .END
        "})
        .unwrap();

        assert_eq!(program.image, vec![0x2001, 0xF025, 0x0013]);
        assert_eq!(program.symbols["value"], 0x3002);
    }

    #[test]
    fn compile_hello_test() {
        let program = compile_source(indoc! {r#"
            .ORIG x3000
            LEA R0, msg
            PUTS
            HALT
            msg
            .STRINGZ "hi"
            .END
        "#})
        .unwrap();

        assert_eq!(
            program.image,
            vec![0xE002, 0xF022, 0xF025, 0x0068, 0x0069, 0x0000]
        );
        assert_eq!(program.symbols["msg"], 0x3003);
    }

    #[test]
    fn compile_attached_label_quirk_test() {
        // A label written on the same line as an instruction points one
        // word past that instruction
        let program = compile_source(indoc! {"
            .ORIG x3000
            here ADD R0, R0, #0
            .END
        "})
        .unwrap();
        assert_eq!(program.symbols["here"], 0x3001);
    }

    #[test]
    fn compile_is_deterministic_test() {
        let source = indoc! {"
            .ORIG x3000
            JSR sub
            HALT
            sub
            ADD R0, R0, #1
            RET
            .END
        "};
        assert_eq!(compile_source(source), compile_source(source));
    }

    #[test]
    fn compile_missing_origin_test() {
        let err = compile_source("ADD R0, R0, #1").unwrap_err();
        assert_eq!(err.kind(), &AssemblyError::OriginNotSet);
        assert_eq!(err.line(), Some(1));
    }

    #[test]
    fn compile_after_end_test() {
        let err = compile_source(indoc! {"
            .ORIG x3000
            .END
            ADD R0, R0, #1
        "})
        .unwrap_err();
        assert_eq!(err.kind(), &AssemblyError::AfterEnd);
        assert_eq!(err.line(), Some(3));
    }

    #[test]
    fn compile_unresolved_label_test() {
        let err = compile_source(indoc! {"
            .ORIG x3000
            BRnzp nowhere
            .END
        "})
        .unwrap_err();
        assert_eq!(
            err.kind(),
            &AssemblyError::UnresolvedLabels(vec!["nowhere".to_owned()])
        );
        assert_eq!(err.line(), None);
    }

    #[test]
    fn compile_classification_error_line_test() {
        let err = compile_source(indoc! {"
            .ORIG x3000
            FROB R1
            .END
        "})
        .unwrap_err();
        assert_eq!(
            err.kind(),
            &AssemblyError::Classification("FROB R1".to_owned())
        );
        assert_eq!(err.line(), Some(2));
    }

    #[test]
    fn compile_blank_and_comment_lines_test() {
        let program = compile_source(indoc! {"
            ; a counting program
            .ORIG x3000

            AND R1, R1, #0  ; clear
            HALT
            .END
        "})
        .unwrap();
        assert_eq!(program.image, vec![0x5260, 0xF025]);
    }
}
