use camino::Utf8PathBuf;
use lc3_emulator::constants::Word;
use lc3_emulator::runtime::Instruction;

#[derive(Debug, clap::Args)]
pub struct DumpOpt {
    /// Assembly source file
    program: Utf8PathBuf,
}

impl DumpOpt {
    pub fn exec(self) -> anyhow::Result<()> {
        let program = super::assemble(&self.program)?;

        println!(".ORIG x{:04X}", program.origin);
        for (index, &word) in program.image.iter().enumerate() {
            let address = program.origin.wrapping_add(index as Word);
            // Data words do not necessarily decode; print them bare
            match Instruction::decode(word) {
                Ok(instruction) => println!("{address:04X}  {word:04X}  {instruction}"),
                Err(_) => println!("{address:04X}  {word:04X}"),
            }
        }

        let mut symbols: Vec<_> = program.symbols.iter().collect();
        symbols.sort_by_key(|&(name, &address)| (address, name.clone()));
        if !symbols.is_empty() {
            println!();
        }
        for (name, address) in symbols {
            println!("{address:04X}  {name}");
        }

        Ok(())
    }
}
