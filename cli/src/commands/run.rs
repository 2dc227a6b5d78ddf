use camino::Utf8PathBuf;
use lc3_emulator::Computer;
use tracing::debug;

#[derive(Debug, clap::Args)]
pub struct RunOpt {
    /// Assembly source file
    program: Utf8PathBuf,

    /// Text to queue on the console keyboard before running
    #[arg(short, long)]
    input: Option<String>,

    /// Fail after this many cycles instead of running forever
    #[arg(long)]
    max_cycles: Option<usize>,
}

impl RunOpt {
    pub fn exec(self) -> anyhow::Result<()> {
        let program = super::assemble(&self.program)?;

        let mut computer = Computer::new();
        computer.load(program)?;
        computer.set_cycle_limit(self.max_cycles);

        let console = computer.console();
        if let Some(input) = &self.input {
            console.push_input(input);
        }

        let result = computer.run();
        print!("{}", console.take_output());
        result?;

        debug!(?computer, "final state");
        Ok(())
    }
}
