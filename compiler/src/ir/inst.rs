use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{BlockId, FuncId, Type, Value};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    NoCapture,
    NonNull,
    NoUndef,
    ZeroExt,
    SignExt,
    ReadOnly,
    NoUnwind,
    NoInline,
    AlwaysInline,
    Custom(String),
}

pub type AttributeSet = BTreeSet<Attribute>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallConv {
    #[default]
    C,
    Fast,
    Cold,
    Numbered(u32),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallAttributes {
    #[serde(default)]
    pub func: AttributeSet,
    #[serde(default)]
    pub ret: AttributeSet,
    /// Parallel to the arguments; may be shorter than them.
    #[serde(default)]
    pub params: Vec<AttributeSet>,
}

impl CallAttributes {
    pub fn param(&self, index: usize) -> Option<&AttributeSet> {
        self.params.get(index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    pub callee: Value,
    pub args: Vec<Value>,
    #[serde(default)]
    pub attrs: CallAttributes,
    #[serde(default)]
    pub call_conv: CallConv,
    #[serde(default)]
    pub tail: bool,
}

impl CallSite {
    pub fn new(callee: Value, args: Vec<Value>) -> Self {
        Self {
            callee,
            args,
            attrs: CallAttributes::default(),
            call_conv: CallConv::default(),
            tail: false,
        }
    }

    pub fn direct(callee: FuncId, args: Vec<Value>) -> Self {
        Self::new(Value::func(callee), args)
    }

    pub fn direct_callee(&self) -> Option<FuncId> {
        self.callee.as_func()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CastOp {
    BitCast,
    IntToPtr,
    PtrToInt,
    Trunc,
    ZExt,
    SExt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    SDiv,
    UDiv,
    And,
    Or,
    Xor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntPredicate {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Ult,
    Ule,
    Ugt,
    Uge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugLoc {
    pub file: String,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstKind {
    Alloca {
        allocated: Type,
    },
    Load {
        ptr: Value,
    },
    Store {
        value: Value,
        ptr: Value,
    },
    Cast {
        op: CastOp,
        value: Value,
    },
    Gep {
        base: Value,
        indices: Vec<Value>,
    },
    Binary {
        op: BinaryOp,
        lhs: Value,
        rhs: Value,
    },
    ICmp {
        pred: IntPredicate,
        lhs: Value,
        rhs: Value,
    },
    Call(CallSite),
    Invoke {
        call: CallSite,
        normal: BlockId,
        unwind: BlockId,
    },
    Ret {
        value: Option<Value>,
    },
    Br {
        target: BlockId,
    },
    CondBr {
        cond: Value,
        then_dest: BlockId,
        else_dest: BlockId,
    },
    Unreachable,
}

impl InstKind {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstKind::Invoke { .. }
                | InstKind::Ret { .. }
                | InstKind::Br { .. }
                | InstKind::CondBr { .. }
                | InstKind::Unreachable
        )
    }

    pub fn call_site(&self) -> Option<&CallSite> {
        match self {
            InstKind::Call(call) | InstKind::Invoke { call, .. } => Some(call),
            _ => None,
        }
    }

    pub fn call_site_mut(&mut self) -> Option<&mut CallSite> {
        match self {
            InstKind::Call(call) | InstKind::Invoke { call, .. } => Some(call),
            _ => None,
        }
    }

    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            InstKind::Invoke { normal, unwind, .. } => vec![*normal, *unwind],
            InstKind::Br { target } => vec![*target],
            InstKind::CondBr {
                then_dest,
                else_dest,
                ..
            } => vec![*then_dest, *else_dest],
            _ => Vec::new(),
        }
    }

    pub fn operands(&self) -> Vec<&Value> {
        match self {
            InstKind::Alloca { .. } | InstKind::Br { .. } | InstKind::Unreachable => Vec::new(),
            InstKind::Load { ptr } => vec![ptr],
            InstKind::Store { value, ptr } => vec![value, ptr],
            InstKind::Cast { value, .. } => vec![value],
            InstKind::Gep { base, indices } => std::iter::once(base).chain(indices).collect(),
            InstKind::Binary { lhs, rhs, .. } | InstKind::ICmp { lhs, rhs, .. } => vec![lhs, rhs],
            InstKind::Call(call) | InstKind::Invoke { call, .. } => {
                std::iter::once(&call.callee).chain(&call.args).collect()
            }
            InstKind::Ret { value } => value.iter().collect(),
            InstKind::CondBr { cond, .. } => vec![cond],
        }
    }

    pub fn operands_mut(&mut self) -> Vec<&mut Value> {
        match self {
            InstKind::Alloca { .. } | InstKind::Br { .. } | InstKind::Unreachable => Vec::new(),
            InstKind::Load { ptr } => vec![ptr],
            InstKind::Store { value, ptr } => vec![value, ptr],
            InstKind::Cast { value, .. } => vec![value],
            InstKind::Gep { base, indices } => {
                std::iter::once(base).chain(indices.iter_mut()).collect()
            }
            InstKind::Binary { lhs, rhs, .. } | InstKind::ICmp { lhs, rhs, .. } => vec![lhs, rhs],
            InstKind::Call(call) | InstKind::Invoke { call, .. } => {
                std::iter::once(&mut call.callee)
                    .chain(call.args.iter_mut())
                    .collect()
            }
            InstKind::Ret { value } => value.iter_mut().collect(),
            InstKind::CondBr { cond, .. } => vec![cond],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    #[serde(default)]
    pub name: Option<String>,
    /// The type of the result; `void` when there is none.
    pub ty: Type,
    pub kind: InstKind,
    #[serde(default)]
    pub debug_loc: Option<DebugLoc>,
}

impl Instruction {
    pub fn new(ty: Type, kind: InstKind) -> Self {
        Self {
            name: None,
            ty,
            kind,
            debug_loc: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_debug_loc(mut self, loc: Option<DebugLoc>) -> Self {
        self.debug_loc = loc;
        self
    }

    pub fn alloca(allocated: Type) -> Self {
        Self::new(allocated.clone().pointer_to(), InstKind::Alloca { allocated })
    }

    pub fn load(ptr: Value, ty: Type) -> Self {
        Self::new(ty, InstKind::Load { ptr })
    }

    pub fn store(value: Value, ptr: Value) -> Self {
        Self::new(Type::Void, InstKind::Store { value, ptr })
    }

    pub fn cast(op: CastOp, value: Value, to: Type) -> Self {
        Self::new(to, InstKind::Cast { op, value })
    }

    pub fn bitcast(value: Value, to: Type) -> Self {
        Self::cast(CastOp::BitCast, value, to)
    }

    pub fn binary(op: BinaryOp, lhs: Value, rhs: Value, ty: Type) -> Self {
        Self::new(ty, InstKind::Binary { op, lhs, rhs })
    }

    pub fn icmp(pred: IntPredicate, lhs: Value, rhs: Value) -> Self {
        Self::new(Type::i1(), InstKind::ICmp { pred, lhs, rhs })
    }

    pub fn call(call: CallSite, ret: Type) -> Self {
        Self::new(ret, InstKind::Call(call))
    }

    pub fn ret(value: Option<Value>) -> Self {
        Self::new(Type::Void, InstKind::Ret { value })
    }

    pub fn br(target: BlockId) -> Self {
        Self::new(Type::Void, InstKind::Br { target })
    }

    pub fn cond_br(cond: Value, then_dest: BlockId, else_dest: BlockId) -> Self {
        Self::new(
            Type::Void,
            InstKind::CondBr {
                cond,
                then_dest,
                else_dest,
            },
        )
    }

    pub fn is_terminator(&self) -> bool {
        self.kind.is_terminator()
    }
}
