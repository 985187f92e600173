use std::path::PathBuf;

use clap::Parser;

use crate::io::OutputForm;

/// Instruments variable and return-value assertions in a module and links
/// it with the assertion library.
#[derive(Parser, Debug)]
#[command(name = "vasi", version)]
pub struct Args {
    /// The module to instrument, `-` for standard input
    #[arg(default_value = "-")]
    pub input: PathBuf,
    /// Where to write the instrumented module, `-` for standard output
    #[arg(short, long, default_value = "-")]
    pub output: PathBuf,
    /// Write the textual listing instead of the binary form
    #[arg(short = 'S', action)]
    pub textual: bool,
    /// Write the binary form even if standard output is a terminal
    #[arg(short, long, action)]
    pub force: bool,
    /// Print the module after each pass
    #[arg(short, long = "print-each", action)]
    pub print_each: bool,
    /// Verify the module after each pass
    #[arg(long, action)]
    pub verify_each: bool,
    /// Log the progress of the passes
    #[arg(short, long, action)]
    pub verbose: bool,
    /// The assertion library module, overrides `library_path` of the configurations
    #[arg(long, value_name = "PATH")]
    pub assertions: Option<PathBuf>,
}

impl Args {
    pub fn output_form(&self) -> OutputForm {
        if self.textual {
            OutputForm::Textual
        } else {
            OutputForm::Binary
        }
    }
}
