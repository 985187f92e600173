//! An in-memory, LLVM-shaped intermediate representation.
//!
//! Functions and globals live in per-module arenas and are referenced by
//! stable ids; instructions live in a per-body arena and are placed in
//! blocks by id. Removing an entity leaves a hole in its arena, so ids held
//! elsewhere never silently point to something else.

mod arena;
pub mod display;
mod function;
mod inst;
pub mod link;
mod module;
mod types;
mod value;
pub mod verify;

pub use arena::{Arena, ArenaId};
pub use function::{Block, Body, Function, InstPosition, Linkage, Param};
pub use inst::{
    Attribute, AttributeSet, BinaryOp, CallAttributes, CallConv, CallSite, CastOp, DebugLoc,
    InstKind, Instruction, IntPredicate,
};
pub use module::{GlobalVariable, Module, Subprogram};
pub use types::{FunctionType, StructDef, Type};
pub use value::{Constant, Value};

macro_rules! make_id {
    ($name:ident, $prefix:literal) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(u32);

        impl $name {
            pub const fn new(index: u32) -> Self {
                Self(index)
            }
        }

        impl ArenaId for $name {
            fn from_index(index: usize) -> Self {
                Self(u32::try_from(index).expect("Arena index overflow"))
            }

            fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

make_id!(FuncId, "fn");
make_id!(GlobalId, "g");
make_id!(InstId, "i");
make_id!(BlockId, "bb");
