use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Type {
    Void,
    Int(u32),
    Pointer(Box<Type>),
    /// A named struct whose layout is in the module's struct table.
    Struct(String),
    /// An anonymous struct.
    Literal(Vec<Type>),
    Array(Box<Type>, u64),
    Function(Box<FunctionType>),
}

impl Type {
    pub fn i1() -> Type {
        Type::Int(1)
    }

    pub fn i8() -> Type {
        Type::Int(8)
    }

    pub fn i32() -> Type {
        Type::Int(32)
    }

    pub fn i64() -> Type {
        Type::Int(64)
    }

    pub fn i8_ptr() -> Type {
        Type::i8().pointer_to()
    }

    pub fn named(name: impl Into<String>) -> Type {
        Type::Struct(name.into())
    }

    pub fn pointer_to(self) -> Type {
        Type::Pointer(Box::new(self))
    }

    pub fn array_of(self, len: u64) -> Type {
        Type::Array(Box::new(self), len)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer(_))
    }

    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Pointer(pointee) => Some(pointee),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionType> {
        match self {
            Type::Function(ty) => Some(ty),
            _ => None,
        }
    }

    /// Whether a value of this type can be passed where `expected` is
    /// declared. Pointers are interchangeable, everything else must match.
    pub fn is_compatible_with(&self, expected: &Type) -> bool {
        match (self, expected) {
            (Type::Pointer(_), Type::Pointer(_)) => true,
            (actual, expected) => actual == expected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionType {
    pub ret: Type,
    pub params: Vec<Type>,
    #[serde(default)]
    pub var_arg: bool,
}

impl FunctionType {
    pub fn new(ret: Type, params: Vec<Type>) -> Self {
        Self {
            ret,
            params,
            var_arg: false,
        }
    }

    pub fn var_arg(mut self) -> Self {
        self.var_arg = true;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructDef {
    pub fields: Vec<Type>,
}

impl StructDef {
    pub fn new(fields: Vec<Type>) -> Self {
        Self { fields }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
