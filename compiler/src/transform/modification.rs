use std::collections::{HashMap, HashSet};

use common::log_warn;

use crate::ir::{ArenaId, Body, InstId, InstKind, Instruction};

/* NOTE: Why deferring the modifications?
 * Passes walk over a snapshot of a body's instructions and decide what to
 * add around each of them. Placing the new instructions right away would
 * shift the positions the walk is relying on. Instead, new instructions get
 * their final ids immediately (so they can be referenced by other new
 * instructions) and are placed all together in `commit`.
 */
pub struct BodyModificationUnit {
    next_inst_index: usize,
    new_insts: Vec<Instruction>,
    before: HashMap<InstId, Vec<InstId>>,
    after: HashMap<InstId, Vec<InstId>>,
    entry_slots: Vec<InstId>,
    removals: HashSet<InstId>,
}

impl BodyModificationUnit {
    pub fn new(next_inst_id: InstId) -> Self {
        Self {
            next_inst_index: next_inst_id.index(),
            new_insts: Vec::new(),
            before: HashMap::new(),
            after: HashMap::new(),
            entry_slots: Vec::new(),
            removals: HashSet::new(),
        }
    }

    pub fn for_body(body: &Body) -> Self {
        Self::new(body.next_inst_id())
    }

    fn add_inst(&mut self, inst: Instruction) -> InstId {
        self.new_insts.push(inst);
        InstId::from_index(self.next_inst_index + (self.new_insts.len() - 1))
    }

    /// A pending instruction added by this unit.
    pub fn new_inst(&self, id: InstId) -> Option<&Instruction> {
        id.index()
            .checked_sub(self.next_inst_index)
            .and_then(|i| self.new_insts.get(i))
    }

    pub fn is_empty(&self) -> bool {
        self.new_insts.is_empty() && self.removals.is_empty()
    }
}

pub trait BodyInstructionManager {
    /// Inserts the instructions right before `anchor`, after the ones
    /// previously inserted before it.
    fn insert_before<I>(&mut self, anchor: InstId, insts: I) -> Vec<InstId>
    where
        I: IntoIterator<Item = Instruction>;

    /// Inserts the instructions right after `anchor`, after the ones
    /// previously inserted after it.
    fn insert_after<I>(&mut self, anchor: InstId, insts: I) -> Vec<InstId>
    where
        I: IntoIterator<Item = Instruction>;

    /// Places the instruction in the entry block, after its leading
    /// `alloca`s, so it dominates every other instruction of the body.
    fn add_entry_slot(&mut self, inst: Instruction) -> InstId;

    fn remove(&mut self, id: InstId);
}

impl BodyInstructionManager for BodyModificationUnit {
    fn insert_before<I>(&mut self, anchor: InstId, insts: I) -> Vec<InstId>
    where
        I: IntoIterator<Item = Instruction>,
    {
        let ids: Vec<_> = insts.into_iter().map(|i| self.add_inst(i)).collect();
        self.before.entry(anchor).or_default().extend(&ids);
        ids
    }

    fn insert_after<I>(&mut self, anchor: InstId, insts: I) -> Vec<InstId>
    where
        I: IntoIterator<Item = Instruction>,
    {
        let ids: Vec<_> = insts.into_iter().map(|i| self.add_inst(i)).collect();
        self.after.entry(anchor).or_default().extend(&ids);
        ids
    }

    fn add_entry_slot(&mut self, inst: Instruction) -> InstId {
        let id = self.add_inst(inst);
        self.entry_slots.push(id);
        id
    }

    fn remove(&mut self, id: InstId) {
        if !self.removals.insert(id) {
            log_warn!("Ignoring repeated removal of instruction {id}");
        }
    }
}

impl BodyModificationUnit {
    // Nothing gets into the body until this function gets called.
    pub fn commit(mut self, body: &mut Body) {
        for (i, inst) in std::mem::take(&mut self.new_insts).into_iter().enumerate() {
            let id = body.add_inst(inst);
            // Asserting that the ids that we have given are correct.
            assert_eq!(id.index(), self.next_inst_index + i);
        }

        let entry = body.entry();
        let old_blocks: Vec<Vec<InstId>> = body
            .blocks
            .iter_mut()
            .map(|b| std::mem::take(&mut b.insts))
            .collect();

        for (block_index, old_insts) in old_blocks.into_iter().enumerate() {
            let mut placed = Vec::with_capacity(old_insts.len());

            let is_entry = entry.is_some_and(|e| e.index() == block_index);
            let leading_allocas = if is_entry {
                old_insts
                    .iter()
                    .take_while(|id| {
                        body.try_inst(**id)
                            .is_some_and(|i| matches!(i.kind, InstKind::Alloca { .. }))
                    })
                    .count()
            } else {
                0
            };

            for (i, id) in old_insts.into_iter().enumerate() {
                if is_entry && i == leading_allocas {
                    placed.append(&mut self.entry_slots);
                }
                if let Some(mut ids) = self.before.remove(&id) {
                    placed.append(&mut ids);
                }
                if !self.removals.contains(&id) {
                    placed.push(id);
                }
                if let Some(mut ids) = self.after.remove(&id) {
                    placed.append(&mut ids);
                }
            }
            if is_entry {
                // The whole block was made of allocas.
                placed.append(&mut self.entry_slots);
            }

            body.blocks[block_index].insts = placed;
        }

        for id in self.removals {
            body.remove(id);
        }

        if !self.before.is_empty() || !self.after.is_empty() || !self.entry_slots.is_empty() {
            log_warn!("Some instructions were anchored to instructions outside the body");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Type, Value};

    #[test]
    fn insertions_land_around_their_anchors() {
        let mut body = Body::new();
        let entry = body.add_block("entry");
        let x = body.append(entry, Instruction::alloca(Type::i32()));
        let store = body.append(entry, Instruction::store(Value::i32(1), Value::Inst(x)));
        let ret = body.append(entry, Instruction::ret(None));

        let mut unit = BodyModificationUnit::for_body(&body);
        let slot = unit.add_entry_slot(Instruction::alloca(Type::i8()));
        let first = unit.insert_before(ret, [Instruction::load(Value::Inst(x), Type::i32())]);
        let second = unit.insert_before(ret, [Instruction::load(Value::Inst(slot), Type::i8())]);
        let after = unit.insert_after(x, [Instruction::store(Value::i32(2), Value::Inst(x))]);
        unit.remove(store);
        assert!(unit.new_inst(slot).is_some());
        assert!(unit.new_inst(x).is_none());
        unit.commit(&mut body);

        assert_eq!(
            body.inst_ids(),
            vec![x, after[0], slot, first[0], second[0], ret]
        );
        assert!(body.try_inst(store).is_none());
        assert_eq!(
            body[second[0]].kind,
            InstKind::Load {
                ptr: Value::Inst(slot)
            }
        );
    }
}
