use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{
    Arena, Constant, FuncId, Function, GlobalId, Linkage, StructDef, Type, Value,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalVariable {
    pub name: String,
    /// The type of the stored value; the global itself is a pointer to it.
    pub ty: Type,
    #[serde(default)]
    pub linkage: Linkage,
    #[serde(default)]
    pub constant: bool,
    #[serde(default)]
    pub init: Option<Constant>,
    #[serde(default)]
    pub section: Option<String>,
}

impl GlobalVariable {
    pub fn new(name: impl Into<String>, ty: Type, init: Option<Constant>) -> Self {
        Self {
            name: name.into(),
            ty,
            linkage: Linkage::External,
            constant: false,
            init,
            section: None,
        }
    }

    pub fn private_constant(name: impl Into<String>, ty: Type, init: Constant) -> Self {
        Self {
            linkage: Linkage::Private,
            constant: true,
            ..Self::new(name, ty, Some(init))
        }
    }

    pub fn is_declaration(&self) -> bool {
        self.init.is_none()
    }
}

/// A debug descriptor of a function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subprogram {
    pub name: String,
    pub file: String,
    pub line: u32,
    #[serde(default)]
    pub function: Option<FuncId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    #[serde(default)]
    pub target_triple: Option<String>,
    #[serde(default)]
    pub data_layout: Option<String>,
    #[serde(default)]
    pub struct_types: IndexMap<String, StructDef>,
    #[serde(default)]
    globals: Arena<GlobalId, GlobalVariable>,
    #[serde(default)]
    functions: Arena<FuncId, Function>,
    #[serde(default)]
    pub subprograms: Vec<Subprogram>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /* Functions */

    pub fn add_function(&mut self, function: Function) -> FuncId {
        self.functions.push(function)
    }

    pub fn insert_function_before(&mut self, anchor: FuncId, function: Function) -> FuncId {
        self.functions.insert_before(anchor, function)
    }

    pub fn remove_function(&mut self, id: FuncId) -> Option<Function> {
        self.functions.remove(id)
    }

    pub fn function(&self, id: FuncId) -> Option<&Function> {
        self.functions.get(id)
    }

    pub fn function_mut(&mut self, id: FuncId) -> Option<&mut Function> {
        self.functions.get_mut(id)
    }

    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Function)> + '_ {
        self.functions.iter()
    }

    pub fn functions_mut(&mut self) -> impl Iterator<Item = &mut Function> + '_ {
        self.functions.values_mut()
    }

    /// A snapshot of the function ids in module order.
    pub fn function_ids(&self) -> Vec<FuncId> {
        self.functions.ids()
    }

    pub fn function_by_name(&self, name: &str) -> Option<FuncId> {
        self.functions()
            .find(|(_, f)| f.name == name)
            .map(|(id, _)| id)
    }

    /* Globals */

    pub fn add_global(&mut self, global: GlobalVariable) -> GlobalId {
        self.globals.push(global)
    }

    pub fn remove_global(&mut self, id: GlobalId) -> Option<GlobalVariable> {
        self.globals.remove(id)
    }

    pub fn global(&self, id: GlobalId) -> Option<&GlobalVariable> {
        self.globals.get(id)
    }

    pub fn global_mut(&mut self, id: GlobalId) -> Option<&mut GlobalVariable> {
        self.globals.get_mut(id)
    }

    pub fn globals(&self) -> impl Iterator<Item = (GlobalId, &GlobalVariable)> + '_ {
        self.globals.iter()
    }

    pub fn globals_mut(&mut self) -> impl Iterator<Item = &mut GlobalVariable> + '_ {
        self.globals.values_mut()
    }

    pub fn global_ids(&self) -> Vec<GlobalId> {
        self.globals.ids()
    }

    pub fn global_by_name(&self, name: &str) -> Option<GlobalId> {
        self.globals()
            .find(|(_, g)| g.name == name)
            .map(|(id, _)| id)
    }

    fn is_symbol_taken(&self, name: &str) -> bool {
        self.global_by_name(name).is_some() || self.function_by_name(name).is_some()
    }

    /// `base` if no function or global has that name, otherwise the first
    /// free `base.<n>`.
    pub fn unique_symbol_name(&self, base: &str) -> String {
        if !self.is_symbol_taken(base) {
            return base.to_owned();
        }
        (1..)
            .map(|n| format!("{base}.{n}"))
            .find(|name| !self.is_symbol_taken(name))
            .unwrap_or_else(|| unreachable!())
    }

    /// Adds a private constant C string and returns a `i8*` to its first
    /// character.
    pub fn add_c_string(&mut self, name: &str, text: &str) -> Constant {
        let data = Constant::c_string(text);
        let len = (text.len() + 1) as u64;
        let name = self.unique_symbol_name(name);
        let id = self.add_global(GlobalVariable::private_constant(
            name,
            Type::i8().array_of(len),
            data,
        ));
        Constant::Global(id).first_element(Type::i8())
    }

    /// Reads the C string a constant refers to, e.g. the annotation operand
    /// of a marker: `getelementptr ([N x i8]* @str, 0, 0)`.
    pub fn c_string_of(&self, constant: &Constant) -> Option<String> {
        let Constant::Global(id) = constant.strip_casts() else {
            return None;
        };
        let Some(Constant::Bytes(bytes)) = &self.global(*id)?.init else {
            return None;
        };
        let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
        String::from_utf8(bytes[..end].to_vec()).ok()
    }

    /* Types */

    pub fn struct_type(&self, name: &str) -> Option<&StructDef> {
        self.struct_types.get(name)
    }

    pub fn type_of_constant(&self, constant: &Constant) -> Type {
        match constant {
            Constant::Int { bits, .. } => Type::Int(*bits),
            Constant::Null(ty) | Constant::Undef(ty) | Constant::Zero(ty) => ty.clone(),
            Constant::Bytes(bytes) => Type::i8().array_of(bytes.len() as u64),
            Constant::Struct { ty, .. } => ty.clone(),
            Constant::Array { elem, elems } => elem.clone().array_of(elems.len() as u64),
            Constant::Func(id) => self
                .function(*id)
                .map(|f| Type::Function(Box::new(f.ty.clone())).pointer_to())
                .unwrap_or_else(Type::i8_ptr),
            Constant::Global(id) => self
                .global(*id)
                .map(|g| g.ty.clone().pointer_to())
                .unwrap_or_else(Type::i8_ptr),
            Constant::BitCast(_, ty) | Constant::IntToPtr(_, ty) => ty.clone(),
            Constant::Gep { ty, .. } => ty.clone(),
        }
    }

    /// The type of `value` used inside `function`.
    pub fn type_of_value(&self, function: &Function, value: &Value) -> Option<Type> {
        match value {
            Value::Const(c) => Some(self.type_of_constant(c)),
            local => function.type_of_local(local),
        }
    }

    /* Use lists */

    /// Replaces every reference to function `from` with `to`: callees,
    /// operands, global initializers and debug descriptors.
    pub fn substitute_function(&mut self, from: FuncId, to: FuncId) {
        for function in self.functions.values_mut() {
            let Some(body) = &mut function.body else {
                continue;
            };
            for inst in body.insts_mut() {
                for operand in inst.kind.operands_mut() {
                    operand.substitute_function(from, to);
                }
            }
        }
        for global in self.globals.values_mut() {
            if let Some(init) = &mut global.init {
                init.substitute_function(from, to);
            }
        }
        self.migrate_subprograms(from, to);
    }

    pub fn substitute_global(&mut self, from: GlobalId, to: GlobalId) {
        let substitute = |value: &mut Value| {
            if let Value::Const(c) = value {
                c.substitute_global(from, to);
            }
        };
        for function in self.functions.values_mut() {
            let Some(body) = &mut function.body else {
                continue;
            };
            for inst in body.insts_mut() {
                inst.kind.operands_mut().into_iter().for_each(substitute);
            }
        }
        for global in self.globals.values_mut() {
            if let Some(init) = &mut global.init {
                init.substitute_global(from, to);
            }
        }
    }

    pub fn migrate_subprograms(&mut self, from: FuncId, to: FuncId) {
        self.subprograms
            .iter_mut()
            .filter(|sp| sp.function == Some(from))
            .for_each(|sp| sp.function = Some(to));
    }

    /// Whether anything (an instruction operand or a global initializer)
    /// refers to the function.
    pub fn is_function_used(&self, id: FuncId) -> bool {
        let in_bodies = self.functions().any(|(_, f)| {
            f.body.as_ref().is_some_and(|body| {
                body.iter_insts().any(|(_, inst)| {
                    inst.kind
                        .operands()
                        .into_iter()
                        .filter_map(Value::as_const)
                        .any(|c| c.references_function(id))
                })
            })
        });
        in_bodies
            || self
                .globals()
                .filter_map(|(_, g)| g.init.as_ref())
                .any(|init| init.references_function(id))
    }
}
