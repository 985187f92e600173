use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use super::{
    ArenaId, AttributeSet, BlockId, CallConv, FunctionType, InstId, Instruction, Type, Value,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Linkage {
    #[default]
    External,
    Internal,
    Private,
    Appending,
    LinkOnceOdr,
    Weak,
    ExternalWeak,
}

impl Linkage {
    /// Whether the symbol is invisible outside its module.
    pub fn is_local(self) -> bool {
        matches!(self, Linkage::Internal | Linkage::Private)
    }

    /// Whether another definition of the symbol may be dropped in favor of
    /// this one (or vice versa) when linking.
    pub fn is_discardable(self) -> bool {
        matches!(self, Linkage::LinkOnceOdr | Linkage::Weak | Linkage::ExternalWeak)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub attrs: AttributeSet,
}

impl Param {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            attrs: AttributeSet::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub name: String,
    pub insts: Vec<InstId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstPosition {
    pub block: BlockId,
    pub index: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Body {
    pub blocks: Vec<Block>,
    insts: Vec<Option<Instruction>>,
}

impl Body {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_block(&mut self, name: impl Into<String>) -> BlockId {
        self.blocks.push(Block {
            name: name.into(),
            insts: Vec::new(),
        });
        BlockId::from_index(self.blocks.len() - 1)
    }

    pub fn entry(&self) -> Option<BlockId> {
        (!self.blocks.is_empty()).then(|| BlockId::from_index(0))
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.index())
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len()).map(BlockId::from_index)
    }

    /// The id the next added instruction will get.
    pub fn next_inst_id(&self) -> InstId {
        InstId::from_index(self.insts.len())
    }

    /// Adds the instruction to the body without placing it in a block.
    pub fn add_inst(&mut self, inst: Instruction) -> InstId {
        self.insts.push(Some(inst));
        InstId::from_index(self.insts.len() - 1)
    }

    pub fn append(&mut self, block: BlockId, inst: Instruction) -> InstId {
        let id = self.add_inst(inst);
        self.blocks[block.index()].insts.push(id);
        id
    }

    pub fn insert_at(&mut self, position: InstPosition, id: InstId) {
        self.blocks[position.block.index()]
            .insts
            .insert(position.index, id);
    }

    pub fn try_inst(&self, id: InstId) -> Option<&Instruction> {
        self.insts.get(id.index())?.as_ref()
    }

    pub fn try_inst_mut(&mut self, id: InstId) -> Option<&mut Instruction> {
        self.insts.get_mut(id.index())?.as_mut()
    }

    pub fn position(&self, id: InstId) -> Option<InstPosition> {
        self.blocks.iter().enumerate().find_map(|(b, block)| {
            block
                .insts
                .iter()
                .position(|i| *i == id)
                .map(|index| InstPosition {
                    block: BlockId::from_index(b),
                    index,
                })
        })
    }

    /// The instruction placed right after `id` in its block.
    pub fn next_inst(&self, id: InstId) -> Option<InstId> {
        let pos = self.position(id)?;
        self.blocks[pos.block.index()].insts.get(pos.index + 1).copied()
    }

    /// The instruction placed right before `id` in its block.
    pub fn prev_inst(&self, id: InstId) -> Option<InstId> {
        let pos = self.position(id)?;
        let index = pos.index.checked_sub(1)?;
        self.blocks[pos.block.index()].insts.get(index).copied()
    }

    /// Removes the instruction from its block and from the body.
    pub fn remove(&mut self, id: InstId) -> Option<Instruction> {
        for block in &mut self.blocks {
            block.insts.retain(|i| *i != id);
        }
        self.insts.get_mut(id.index())?.take()
    }

    /// Placed instructions in block order, as a snapshot of their ids.
    pub fn inst_ids(&self) -> Vec<InstId> {
        self.blocks
            .iter()
            .flat_map(|b| b.insts.iter().copied())
            .collect()
    }

    pub fn iter_insts(&self) -> impl Iterator<Item = (InstId, &Instruction)> + '_ {
        self.blocks
            .iter()
            .flat_map(|b| b.insts.iter())
            .filter_map(|id| self.try_inst(*id).map(|inst| (*id, inst)))
    }

    pub fn insts_mut(&mut self) -> impl Iterator<Item = &mut Instruction> + '_ {
        self.insts.iter_mut().filter_map(Option::as_mut)
    }

    pub fn replace_all_uses(&mut self, from: &Value, to: &Value) -> usize {
        let mut count = 0;
        for inst in self.insts_mut() {
            for operand in inst.kind.operands_mut() {
                if operand == from {
                    *operand = to.clone();
                    count += 1;
                }
            }
        }
        count
    }

    pub fn has_uses(&self, value: &Value) -> bool {
        self.iter_insts()
            .any(|(_, inst)| inst.kind.operands().into_iter().any(|op| op == value))
    }
}

impl Index<InstId> for Body {
    type Output = Instruction;

    fn index(&self, id: InstId) -> &Self::Output {
        self.try_inst(id)
            .unwrap_or_else(|| panic!("Access to a removed instruction: {id}"))
    }
}

impl IndexMut<InstId> for Body {
    fn index_mut(&mut self, id: InstId) -> &mut Self::Output {
        self.try_inst_mut(id)
            .unwrap_or_else(|| panic!("Access to a removed instruction: {id}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub ty: FunctionType,
    pub params: Vec<Param>,
    #[serde(default)]
    pub linkage: Linkage,
    #[serde(default)]
    pub call_conv: CallConv,
    #[serde(default)]
    pub attrs: AttributeSet,
    #[serde(default)]
    pub ret_attrs: AttributeSet,
    #[serde(default)]
    pub body: Option<Body>,
}

impl Function {
    pub fn declaration(name: impl Into<String>, ty: FunctionType) -> Self {
        let params = vec![Param::default(); ty.params.len()];
        Self {
            name: name.into(),
            ty,
            params,
            linkage: Linkage::External,
            call_conv: CallConv::default(),
            attrs: AttributeSet::new(),
            ret_attrs: AttributeSet::new(),
            body: None,
        }
    }

    pub fn definition(name: impl Into<String>, ty: FunctionType, body: Body) -> Self {
        Self {
            body: Some(body),
            ..Self::declaration(name, ty)
        }
    }

    pub fn with_param_names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        for (param, name) in self.params.iter_mut().zip(names) {
            param.name = Some(name.into());
        }
        self
    }

    pub fn with_linkage(mut self, linkage: Linkage) -> Self {
        self.linkage = linkage;
        self
    }

    pub fn is_declaration(&self) -> bool {
        self.body.is_none()
    }

    pub fn ret_type(&self) -> &Type {
        &self.ty.ret
    }

    pub fn param_index_by_name(&self, name: &str) -> Option<u32> {
        self.params
            .iter()
            .position(|p| p.name.as_deref() == Some(name))
            .map(|i| i as u32)
    }

    pub fn param_type(&self, index: u32) -> Option<&Type> {
        self.ty.params.get(index as usize)
    }

    /// The type of a value as seen from inside this function.
    /// `None` for dangling references.
    pub fn type_of_local(&self, value: &Value) -> Option<Type> {
        match value {
            Value::Inst(id) => self.body.as_ref()?.try_inst(*id).map(|i| i.ty.clone()),
            Value::Arg(index) => self.param_type(*index).cloned(),
            Value::Const(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighbours_are_within_a_block() {
        let mut body = Body::new();
        let entry = body.add_block("entry");
        let exit = body.add_block("exit");
        let slot = body.append(entry, Instruction::alloca(Type::i32()));
        let store = body.append(entry, Instruction::store(Value::i32(1), Value::Inst(slot)));
        let br = body.append(entry, Instruction::br(exit));
        let ret = body.append(exit, Instruction::ret(None));

        assert_eq!(body.next_inst(slot), Some(store));
        assert_eq!(body.prev_inst(store), Some(slot));
        assert_eq!(body.next_inst(br), None);
        assert_eq!(body.prev_inst(ret), None);
        assert_eq!(
            body.position(ret),
            Some(InstPosition {
                block: exit,
                index: 0
            })
        );
    }

    #[test]
    fn removal_and_use_replacement() {
        let mut body = Body::new();
        let entry = body.add_block("entry");
        let a = body.append(entry, Instruction::alloca(Type::i32()));
        let b = body.append(entry, Instruction::alloca(Type::i32()));
        let store = body.append(entry, Instruction::store(Value::i32(1), Value::Inst(a)));

        assert!(body.has_uses(&Value::Inst(a)));
        assert_eq!(body.replace_all_uses(&Value::Inst(a), &Value::Inst(b)), 1);
        assert!(!body.has_uses(&Value::Inst(a)));
        assert!(body.remove(a).is_some());
        assert!(body.try_inst(a).is_none());
        assert_eq!(body.inst_ids(), vec![b, store]);
    }
}
