//! Building blocks of the instrumentation passes.

pub mod annotations;
pub mod context;
pub mod markers;
pub mod modification;
pub mod signature;

pub use annotations::{extract, AnnotationRecord, GlobalAnnotations};
pub use context::{InstrumentationContext, RoutineKind, StateType};
pub use signature::{replace_signature, ParamDecl};
