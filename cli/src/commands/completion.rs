use clap::CommandFactory;
use clap_complete::{generate, Shell};

#[derive(Debug, clap::Args)]
pub struct CompletionOpt {
    /// Shell to generate a completion script for
    #[arg(value_enum)]
    shell: Shell,
}

impl CompletionOpt {
    pub fn exec(self) -> anyhow::Result<()> {
        let mut command = crate::Opt::command();
        generate(self.shell, &mut command, "lc3", &mut std::io::stdout());
        Ok(())
    }
}
