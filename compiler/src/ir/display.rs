//! LLVM-assembly-like listing of modules.

use std::fmt::{self, Display, Formatter, Write};

use itertools::Itertools;

use super::{
    Attribute, AttributeSet, BinaryOp, CallConv, CallSite, CastOp, Constant, Function,
    FunctionType, GlobalVariable, InstId, InstKind, Instruction, IntPredicate, Linkage, Module, Type,
    Value,
};

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Int(bits) => write!(f, "i{bits}"),
            Type::Pointer(pointee) => write!(f, "{pointee}*"),
            Type::Struct(name) => write!(f, "%{name}"),
            Type::Literal(fields) => write!(f, "{{ {} }}", fields.iter().join(", ")),
            Type::Array(elem, len) => write!(f, "[{len} x {elem}]"),
            Type::Function(ty) => write!(f, "{ty}"),
        }
    }
}

impl Display for FunctionType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let var_arg = match (self.var_arg, self.params.is_empty()) {
            (false, _) => "",
            (true, true) => "...",
            (true, false) => ", ...",
        };
        write!(f, "{} ({}{var_arg})", self.ret, self.params.iter().join(", "))
    }
}

impl Display for Attribute {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Attribute::NoCapture => "nocapture",
            Attribute::NonNull => "nonnull",
            Attribute::NoUndef => "noundef",
            Attribute::ZeroExt => "zeroext",
            Attribute::SignExt => "signext",
            Attribute::ReadOnly => "readonly",
            Attribute::NoUnwind => "nounwind",
            Attribute::NoInline => "noinline",
            Attribute::AlwaysInline => "alwaysinline",
            Attribute::Custom(name) => name,
        };
        f.write_str(name)
    }
}

impl Display for Linkage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Linkage::External => "",
            Linkage::Internal => "internal ",
            Linkage::Private => "private ",
            Linkage::Appending => "appending ",
            Linkage::LinkOnceOdr => "linkonce_odr ",
            Linkage::Weak => "weak ",
            Linkage::ExternalWeak => "extern_weak ",
        })
    }
}

impl Display for CallConv {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CallConv::C => Ok(()),
            CallConv::Fast => f.write_str("fastcc "),
            CallConv::Cold => f.write_str("coldcc "),
            CallConv::Numbered(n) => write!(f, "cc{n} "),
        }
    }
}

fn attrs_suffix(attrs: &AttributeSet) -> String {
    attrs.iter().map(|a| format!(" {a}")).collect()
}

fn escape_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| match b {
            b' '..=b'~' if *b != b'"' && *b != b'\\' => (*b as char).to_string(),
            _ => format!("\\{b:02X}"),
        })
        .collect()
}

/// Renders constants and values with the names they have in a module.
struct Printer<'m> {
    module: &'m Module,
}

impl Printer<'_> {
    fn constant(&self, c: &Constant) -> String {
        match c {
            Constant::Int { bits: 1, value } => (*value != 0).to_string(),
            Constant::Int { value, .. } => value.to_string(),
            Constant::Null(_) => "null".to_owned(),
            Constant::Undef(_) => "undef".to_owned(),
            Constant::Zero(_) => "zeroinitializer".to_owned(),
            Constant::Bytes(bytes) => format!("c\"{}\"", escape_bytes(bytes)),
            Constant::Struct { fields, .. } => {
                format!("{{ {} }}", fields.iter().map(|c| self.typed_constant(c)).join(", "))
            }
            Constant::Array { elems, .. } => {
                format!("[{}]", elems.iter().map(|c| self.typed_constant(c)).join(", "))
            }
            Constant::Func(id) => match self.module.function(*id) {
                Some(function) => format!("@{}", function.name),
                None => format!("@<removed {id}>"),
            },
            Constant::Global(id) => match self.module.global(*id) {
                Some(global) => format!("@{}", global.name),
                None => format!("@<removed {id}>"),
            },
            Constant::BitCast(inner, ty) => {
                format!("bitcast ({} to {ty})", self.typed_constant(inner))
            }
            Constant::IntToPtr(inner, ty) => {
                format!("inttoptr ({} to {ty})", self.typed_constant(inner))
            }
            Constant::Gep { base, indices, .. } => format!(
                "getelementptr ({}{})",
                self.typed_constant(base),
                indices.iter().map(|i| format!(", i32 {i}")).join("")
            ),
        }
    }

    fn typed_constant(&self, c: &Constant) -> String {
        format!("{} {}", self.module.type_of_constant(c), self.constant(c))
    }

    fn value(&self, function: &Function, value: &Value) -> String {
        match value {
            Value::Inst(id) => {
                let name = function
                    .body
                    .as_ref()
                    .and_then(|b| b.try_inst(*id))
                    .and_then(|i| i.name.clone());
                match name {
                    Some(name) => format!("%{name}"),
                    None => format!("%{}", id),
                }
            }
            Value::Arg(index) => match function
                .params
                .get(*index as usize)
                .and_then(|p| p.name.as_ref())
            {
                Some(name) => format!("%{name}"),
                None => format!("%arg{index}"),
            },
            Value::Const(c) => self.constant(c),
        }
    }

    fn value_type(&self, function: &Function, value: &Value) -> String {
        self.module
            .type_of_value(function, value)
            .map(|t| t.to_string())
            .unwrap_or_else(|| "<?>".to_owned())
    }

    fn typed_value(&self, function: &Function, value: &Value) -> String {
        format!(
            "{} {}",
            self.value_type(function, value),
            self.value(function, value)
        )
    }

    fn call(&self, function: &Function, inst: &Instruction, call: &CallSite) -> String {
        let args = call
            .args
            .iter()
            .enumerate()
            .map(|(i, arg)| {
                format!(
                    "{}{} {}",
                    self.value_type(function, arg),
                    call.attrs.param(i).map(attrs_suffix).unwrap_or_default(),
                    self.value(function, arg)
                )
            })
            .join(", ");
        format!(
            "{}{}{} {}({}){}",
            call.call_conv,
            inst.ty,
            attrs_suffix(&call.attrs.ret),
            self.value(function, &call.callee),
            args,
            attrs_suffix(&call.attrs.func),
        )
    }

    fn instruction(&self, function: &Function, id: InstId, inst: &Instruction) -> String {
        let tv = |v: &Value| self.typed_value(function, v);
        let body = match &inst.kind {
            InstKind::Alloca { allocated } => format!("alloca {allocated}"),
            InstKind::Load { ptr } => format!("load {}, {}", inst.ty, tv(ptr)),
            InstKind::Store { value, ptr } => format!("store {}, {}", tv(value), tv(ptr)),
            InstKind::Cast { op, value } => {
                format!("{} {} to {}", cast_name(*op), tv(value), inst.ty)
            }
            InstKind::Gep { base, indices } => format!(
                "getelementptr {}{}",
                tv(base),
                indices.iter().map(|i| format!(", {}", tv(i))).join("")
            ),
            InstKind::Binary { op, lhs, rhs } => format!(
                "{} {}, {}",
                binary_name(*op),
                tv(lhs),
                self.value(function, rhs)
            ),
            InstKind::ICmp { pred, lhs, rhs } => format!(
                "icmp {} {}, {}",
                predicate_name(*pred),
                tv(lhs),
                self.value(function, rhs)
            ),
            InstKind::Call(call) => format!(
                "{}call {}",
                if call.tail { "tail " } else { "" },
                self.call(function, inst, call)
            ),
            InstKind::Invoke {
                call,
                normal,
                unwind,
            } => format!(
                "invoke {} to label %{} unwind label %{}",
                self.call(function, inst, call),
                block_name(function, *normal),
                block_name(function, *unwind)
            ),
            InstKind::Ret { value: None } => "ret void".to_owned(),
            InstKind::Ret { value: Some(v) } => format!("ret {}", tv(v)),
            InstKind::Br { target } => format!("br label %{}", block_name(function, *target)),
            InstKind::CondBr {
                cond,
                then_dest,
                else_dest,
            } => format!(
                "br {}, label %{}, label %{}",
                tv(cond),
                block_name(function, *then_dest),
                block_name(function, *else_dest)
            ),
            InstKind::Unreachable => "unreachable".to_owned(),
        };
        let loc = inst
            .debug_loc
            .as_ref()
            .map(|l| format!(" ; {}:{}", l.file, l.line))
            .unwrap_or_default();
        if inst.ty.is_void() {
            return body + &loc;
        }
        match inst.name.as_ref() {
            Some(name) => format!("%{name} = {body}{loc}"),
            None => format!("%{id} = {body}{loc}"),
        }
    }

    fn global(&self, global: &GlobalVariable) -> String {
        let mut line = format!(
            "@{} = {}{} {}",
            global.name,
            global.linkage,
            if global.constant { "constant" } else { "global" },
            global.ty,
        );
        match &global.init {
            Some(init) => {
                let _ = write!(line, " {}", self.constant(init));
            }
            None => line.insert_str(line.find('=').map_or(0, |i| i + 2), "external "),
        }
        if let Some(section) = &global.section {
            let _ = write!(line, ", section \"{section}\"");
        }
        line
    }

    fn function(&self, f: &mut Formatter<'_>, function: &Function) -> fmt::Result {
        let params = function
            .ty
            .params
            .iter()
            .zip(&function.params)
            .map(|(ty, param)| {
                let name = param
                    .name
                    .as_ref()
                    .map(|n| format!(" %{n}"))
                    .unwrap_or_default();
                format!("{ty}{}{name}", attrs_suffix(&param.attrs))
            })
            .chain(function.ty.var_arg.then(|| "...".to_owned()))
            .join(", ");
        let header = format!(
            "{}{}{}{} @{}({}){}",
            function.linkage,
            function.call_conv,
            function.ty.ret,
            attrs_suffix(&function.ret_attrs),
            function.name,
            params,
            attrs_suffix(&function.attrs),
        );

        let Some(body) = &function.body else {
            return writeln!(f, "declare {header}");
        };
        writeln!(f, "define {header} {{")?;
        for (i, block) in body.blocks.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{}:", block.name)?;
            for id in &block.insts {
                match body.try_inst(*id) {
                    Some(inst) => writeln!(f, "  {}", self.instruction(function, *id, inst))?,
                    None => writeln!(f, "  ; <removed {id}>")?,
                }
            }
        }
        writeln!(f, "}}")
    }
}

fn block_name(function: &Function, id: super::BlockId) -> String {
    function
        .body
        .as_ref()
        .and_then(|b| b.block(id))
        .map(|b| b.name.clone())
        .unwrap_or_else(|| id.to_string())
}

fn cast_name(op: CastOp) -> &'static str {
    match op {
        CastOp::BitCast => "bitcast",
        CastOp::IntToPtr => "inttoptr",
        CastOp::PtrToInt => "ptrtoint",
        CastOp::Trunc => "trunc",
        CastOp::ZExt => "zext",
        CastOp::SExt => "sext",
    }
}

fn binary_name(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "add",
        BinaryOp::Sub => "sub",
        BinaryOp::Mul => "mul",
        BinaryOp::SDiv => "sdiv",
        BinaryOp::UDiv => "udiv",
        BinaryOp::And => "and",
        BinaryOp::Or => "or",
        BinaryOp::Xor => "xor",
    }
}

fn predicate_name(pred: IntPredicate) -> &'static str {
    match pred {
        IntPredicate::Eq => "eq",
        IntPredicate::Ne => "ne",
        IntPredicate::Slt => "slt",
        IntPredicate::Sle => "sle",
        IntPredicate::Sgt => "sgt",
        IntPredicate::Sge => "sge",
        IntPredicate::Ult => "ult",
        IntPredicate::Ule => "ule",
        IntPredicate::Ugt => "ugt",
        IntPredicate::Uge => "uge",
    }
}

impl Display for Module {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let printer = Printer { module: self };
        writeln!(f, "; ModuleID = '{}'", self.name)?;
        if let Some(layout) = &self.data_layout {
            writeln!(f, "target datalayout = \"{layout}\"")?;
        }
        if let Some(triple) = &self.target_triple {
            writeln!(f, "target triple = \"{triple}\"")?;
        }

        if !self.struct_types.is_empty() {
            writeln!(f)?;
        }
        for (name, def) in &self.struct_types {
            writeln!(f, "%{name} = type {{ {} }}", def.fields.iter().join(", "))?;
        }

        if self.globals().next().is_some() {
            writeln!(f)?;
        }
        for (_, global) in self.globals() {
            writeln!(f, "{}", printer.global(global))?;
        }

        for (_, function) in self.functions() {
            writeln!(f)?;
            printer.function(f, function)?;
        }

        if !self.subprograms.is_empty() {
            writeln!(f)?;
        }
        for sp in &self.subprograms {
            let described = sp
                .function
                .and_then(|id| self.function(id))
                .map(|func| format!("@{}", func.name))
                .unwrap_or_else(|| "null".to_owned());
            writeln!(
                f,
                "; subprogram {} ({}:{}) -> {described}",
                sp.name, sp.file, sp.line
            )?;
        }
        Ok(())
    }
}
