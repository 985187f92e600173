//! Reading and writing modules.

use std::fs;
use std::io::{self, IsTerminal, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::ir::Module;

pub(crate) const STD_STREAM: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputForm {
    /// The serialized interchange form.
    Binary,
    /// The human-readable listing.
    Textual,
}

fn is_ron(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "ron")
}

pub fn parse_module(content: &str, ron: bool) -> Result<Module> {
    if ron {
        ron::from_str(content).context("Failed to parse the RON module")
    } else {
        serde_json::from_str(content).context("Failed to parse the JSON module")
    }
}

/// Loads a module from a file, or from standard input for `-`.
pub fn load_module(path: &Path) -> Result<Module> {
    if path.as_os_str() == STD_STREAM {
        let mut content = String::new();
        io::stdin()
            .read_to_string(&mut content)
            .context("Failed to read the module from standard input")?;
        return parse_module(&content, false);
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read module file `{}`", path.display()))?;
    parse_module(&content, is_ron(path))
        .with_context(|| format!("Invalid module file `{}`", path.display()))
}

pub fn render_module(module: &Module, form: OutputForm) -> Result<String> {
    match form {
        OutputForm::Binary => {
            serde_json::to_string(module).context("Failed to serialize the module")
        }
        OutputForm::Textual => Ok(module.to_string()),
    }
}

/// Whether writing to `path` would put the binary form on a terminal.
pub fn writes_binary_to_terminal(path: &Path, form: OutputForm) -> bool {
    form == OutputForm::Binary && path.as_os_str() == STD_STREAM && io::stdout().is_terminal()
}

pub fn write_module(module: &Module, path: &Path, form: OutputForm) -> Result<()> {
    let content = render_module(module, form)?;
    if path.as_os_str() == STD_STREAM {
        let mut stdout = io::stdout().lock();
        stdout
            .write_all(content.as_bytes())
            .and_then(|_| stdout.flush())
            .context("Failed to write the module to standard output")
    } else {
        fs::write(path, content)
            .with_context(|| format!("Failed to write module file `{}`", path.display()))
    }
}
