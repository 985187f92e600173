mod callee;
mod caller;
pub(crate) mod logger;

use crate::error::Result;
use crate::ir::Module;
use crate::transform::InstrumentationContext;
use crate::utils::Chain;

pub use callee::CalleeInstrumenter;
pub use caller::CallerInstrumenter;
pub(crate) use logger::ModulePassLogExt;

/// A whole-module transformation.
pub trait ModulePass {
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn run(&mut self, module: &mut Module, cx: &mut InstrumentationContext) -> Result<()>;
}

impl<A: ModulePass, B: ModulePass> ModulePass for Chain<A, B> {
    fn name(&self) -> &'static str {
        "chain"
    }

    fn run(&mut self, module: &mut Module, cx: &mut InstrumentationContext) -> Result<()> {
        self.first.run(module, cx)?;
        self.second.run(module, cx)
    }
}
