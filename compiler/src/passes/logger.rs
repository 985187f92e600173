use common::{log_debug, log_info, log_module_dump};

use super::ModulePass;
use crate::error::Result;
use crate::ir::{verify::verify_module, Module};
use crate::transform::InstrumentationContext;

/// A wrapper pass that logs pass runs and optionally checks or prints the
/// module after the wrapped pass.
pub(crate) struct LoggerPass<T> {
    pass: T,
    verify: bool,
    print: bool,
}

impl<T> LoggerPass<T> {
    pub(crate) fn verified(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub(crate) fn printed(mut self, print: bool) -> Self {
        self.print = print;
        self
    }
}

impl<T> ModulePass for LoggerPass<T>
where
    T: ModulePass,
{
    fn name(&self) -> &'static str {
        self.pass.name()
    }

    fn run(&mut self, module: &mut Module, cx: &mut InstrumentationContext) -> Result<()> {
        let name = self.pass.name();
        log_info!("Running pass {name} on module `{}`", module.name);
        log_module_dump!("Module before {name}:\n{module}");

        self.pass.run(module, cx)?;

        log_module_dump!("Module after {name}:\n{module}");
        if self.verify {
            log_debug!("Verifying module after {name}");
            verify_module(module)?;
        }
        if self.print {
            eprintln!("; After {name}\n{module}");
        }
        Ok(())
    }
}

pub(crate) trait ModulePassLogExt {
    fn into_logged(self) -> LoggerPass<Self>
    where
        Self: Sized;
}
impl<T: ModulePass> ModulePassLogExt for T {
    fn into_logged(self) -> LoggerPass<T>
    where
        Self: Sized,
    {
        LoggerPass {
            pass: self,
            verify: false,
            print: false,
        }
    }
}
