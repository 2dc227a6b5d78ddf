use anyhow::Context;
use camino::Utf8Path;
use lc3_emulator::assembler::CompileError;
use lc3_emulator::Program;
use miette::{miette, LabeledSpan};

mod completion;
mod dump;
mod run;

#[derive(Debug, clap::Subcommand)]
pub enum Subcommand {
    /// Assemble a program and run it
    Run(run::RunOpt),

    /// Assemble a program and print its image and symbol table
    Dump(dump::DumpOpt),

    /// Print a shell completion script
    Completion(completion::CompletionOpt),
}

impl Subcommand {
    pub fn exec(self) -> anyhow::Result<()> {
        match self {
            Subcommand::Run(opt) => opt.exec(),
            Subcommand::Dump(opt) => opt.exec(),
            Subcommand::Completion(opt) => opt.exec(),
        }
    }
}

/// Read and assemble a source file, printing a labelled report on failure.
fn assemble(path: &Utf8Path) -> anyhow::Result<Program> {
    let source = std::fs::read_to_string(path).with_context(|| format!("could not read {path}"))?;

    lc3_emulator::compile_source(&source).map_err(|err| {
        let report = report(&source, &err);
        eprintln!("{report:?}");
        anyhow::anyhow!("failed to assemble {path}")
    })
}

fn report(source: &str, err: &CompileError) -> miette::Report {
    let report = if let Some((offset, length)) = err.line().and_then(|line| line_span(source, line))
    {
        miette!(
            labels = vec![LabeledSpan::at(offset..offset + length, err.kind().to_string())],
            "failed to assemble program"
        )
    } else {
        miette!("failed to assemble program: {}", err.kind())
    };
    report.with_source_code(source.to_owned())
}

/// Byte offset and length of a 1-based source line.
fn line_span(source: &str, line: usize) -> Option<(usize, usize)> {
    let mut offset = 0;
    for (index, text) in source.split_inclusive('\n').enumerate() {
        if index + 1 == line {
            return Some((offset, text.trim_end().len()));
        }
        offset += text.len();
    }
    None
}
