use serde::{Deserialize, Serialize};

use super::{FuncId, GlobalId, InstId, Type};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    /// The result of an instruction of the enclosing function.
    Inst(InstId),
    /// An argument of the enclosing function, by position.
    Arg(u32),
    Const(Constant),
}

impl Value {
    pub fn func(id: FuncId) -> Value {
        Value::Const(Constant::Func(id))
    }

    pub fn global(id: GlobalId) -> Value {
        Value::Const(Constant::Global(id))
    }

    pub fn i32(value: i64) -> Value {
        Value::Const(Constant::i32(value))
    }

    pub fn as_inst(&self) -> Option<InstId> {
        match self {
            Value::Inst(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_const(&self) -> Option<&Constant> {
        match self {
            Value::Const(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_func(&self) -> Option<FuncId> {
        self.as_const().and_then(|c| match c.strip_casts() {
            Constant::Func(id) => Some(*id),
            _ => None,
        })
    }

    pub fn is_undef(&self) -> bool {
        matches!(self, Value::Const(Constant::Undef(_)))
    }

    /// Substitutes every reference to function `from` nested in this value.
    /// Returns whether anything changed.
    pub fn substitute_function(&mut self, from: FuncId, to: FuncId) -> bool {
        match self {
            Value::Const(c) => c.substitute_function(from, to),
            _ => false,
        }
    }
}

impl From<Constant> for Value {
    fn from(value: Constant) -> Self {
        Value::Const(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constant {
    Int {
        bits: u32,
        value: i64,
    },
    /// A null pointer of the given pointer type.
    Null(Type),
    Undef(Type),
    Zero(Type),
    /// `[N x i8]` data, including any terminator.
    Bytes(Vec<u8>),
    Struct {
        ty: Type,
        fields: Vec<Constant>,
    },
    Array {
        elem: Type,
        elems: Vec<Constant>,
    },
    Func(FuncId),
    Global(GlobalId),
    BitCast(Box<Constant>, Type),
    IntToPtr(Box<Constant>, Type),
    Gep {
        base: Box<Constant>,
        indices: Vec<u64>,
        ty: Type,
    },
}

impl Constant {
    pub fn int(bits: u32, value: i64) -> Constant {
        Constant::Int { bits, value }
    }

    pub fn i32(value: i64) -> Constant {
        Constant::int(32, value)
    }

    pub fn null(pointer_ty: Type) -> Constant {
        Constant::Null(pointer_ty)
    }

    pub fn c_string(text: &str) -> Constant {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        Constant::Bytes(bytes)
    }

    pub fn bitcast(self, to: Type) -> Constant {
        Constant::BitCast(Box::new(self), to)
    }

    /// `getelementptr (base, 0, 0)`: the address of the first element of an
    /// array global, typed as a pointer to the element.
    pub fn first_element(self, elem: Type) -> Constant {
        Constant::Gep {
            base: Box::new(self),
            indices: vec![0, 0],
            ty: elem.pointer_to(),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Constant::Int { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Looks through casts and zero-offset element addressing to the
    /// underlying entity.
    pub fn strip_casts(&self) -> &Constant {
        match self {
            Constant::BitCast(inner, _) => inner.strip_casts(),
            Constant::Gep { base, indices, .. } if indices.iter().all(|i| *i == 0) => {
                base.strip_casts()
            }
            other => other,
        }
    }

    pub fn children(&self) -> Vec<&Constant> {
        match self {
            Constant::Struct { fields: nested, .. } | Constant::Array { elems: nested, .. } => {
                nested.iter().collect()
            }
            Constant::BitCast(inner, _) | Constant::IntToPtr(inner, _) => vec![inner],
            Constant::Gep { base, .. } => vec![base],
            _ => Vec::new(),
        }
    }

    /// Calls `f` on this constant and every nested constant, parents first.
    pub fn visit(&self, f: &mut impl FnMut(&Constant)) {
        f(self);
        for child in self.children() {
            child.visit(f);
        }
    }

    pub fn visit_mut(&mut self, f: &mut impl FnMut(&mut Constant)) {
        f(self);
        match self {
            Constant::Struct { fields: nested, .. } | Constant::Array { elems: nested, .. } => {
                nested.iter_mut().for_each(|c| c.visit_mut(f))
            }
            Constant::BitCast(inner, _) | Constant::IntToPtr(inner, _) => inner.visit_mut(f),
            Constant::Gep { base, .. } => base.visit_mut(f),
            _ => {}
        }
    }

    pub fn substitute_function(&mut self, from: FuncId, to: FuncId) -> bool {
        let mut changed = false;
        self.visit_mut(&mut |c| {
            if *c == Constant::Func(from) {
                *c = Constant::Func(to);
                changed = true;
            }
        });
        changed
    }

    pub fn substitute_global(&mut self, from: GlobalId, to: GlobalId) -> bool {
        let mut changed = false;
        self.visit_mut(&mut |c| {
            if *c == Constant::Global(from) {
                *c = Constant::Global(to);
                changed = true;
            }
        });
        changed
    }

    pub fn references_function(&self, id: FuncId) -> bool {
        let mut found = false;
        self.visit(&mut |c| found |= *c == Constant::Func(id));
        found
    }

    pub fn references_global(&self, id: GlobalId) -> bool {
        let mut found = false;
        self.visit(&mut |c| found |= *c == Constant::Global(id));
        found
    }
}
