//! Variable environment at one program point

use crate::bound::VariableHandle;
use crate::types::{ContextId, TypeRefMask};
use serde::Serialize;

/// What is known about one variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VarSlot {
    pub mask: TypeRefMask,
    /// Definitely assigned on every path reaching this point
    pub initialized: bool,
    /// May be aliased through a reference
    pub by_ref: bool,
    /// Proven to hold a `long` strictly below `i64::MAX`
    pub less_than_long_max: bool,
}

impl VarSlot {
    const UNSET: VarSlot = VarSlot {
        mask: TypeRefMask::EMPTY,
        initialized: false,
        by_ref: false,
        less_than_long_max: false,
    };

    fn by_ref_mask() -> TypeRefMask {
        TypeRefMask::ANY.with_ref(true)
    }

    fn join(&mut self, other: &VarSlot) {
        self.mask |= other.mask;
        self.initialized &= other.initialized;
        self.by_ref |= other.by_ref;
        self.less_than_long_max &= other.less_than_long_max;
        if self.by_ref {
            self.mask = Self::by_ref_mask();
        }
    }
}

/// Snapshot of every tracked variable of a routine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowState {
    context: ContextId,
    slots: Vec<VarSlot>,
}

impl FlowState {
    /// All variables unassigned
    pub fn new(context: ContextId, variables: usize) -> Self {
        Self {
            context,
            slots: vec![VarSlot::UNSET; variables],
        }
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, var: VariableHandle) -> &VarSlot {
        &self.slots[var.index()]
    }

    pub fn slots(&self) -> &[VarSlot] {
        &self.slots
    }

    pub fn get_local_type(&self, var: VariableHandle) -> TypeRefMask {
        self.slot(var).mask
    }

    /// Assign `mask`; references keep their aliased mask
    pub fn set_local_type(&mut self, var: VariableHandle, mask: TypeRefMask) {
        let slot = &mut self.slots[var.index()];
        slot.initialized = true;
        slot.less_than_long_max = false;
        slot.mask = if slot.by_ref {
            VarSlot::by_ref_mask()
        } else {
            mask.with_ref(false)
        };
    }

    pub fn is_local_set(&self, var: VariableHandle) -> bool {
        self.slot(var).initialized
    }

    pub fn is_by_ref(&self, var: VariableHandle) -> bool {
        self.slot(var).by_ref
    }

    pub fn set_var_initialized(&mut self, var: VariableHandle) {
        self.slots[var.index()].initialized = true;
    }

    /// `unset($x)`: the slot forgets its value and any reference binding
    pub fn set_var_uninitialized(&mut self, var: VariableHandle) {
        self.slots[var.index()] = VarSlot::UNSET;
    }

    pub fn mark_local_by_ref(&mut self, var: VariableHandle) {
        let slot = &mut self.slots[var.index()];
        slot.by_ref = true;
        slot.initialized = true;
        slot.less_than_long_max = false;
        slot.mask = VarSlot::by_ref_mask();
    }

    pub fn set_less_than_long_max(&mut self, var: VariableHandle, value: bool) {
        let slot = &mut self.slots[var.index()];
        slot.less_than_long_max = value && !slot.by_ref;
    }

    pub fn is_less_than_long_max(&self, var: VariableHandle) -> bool {
        self.slot(var).less_than_long_max
    }

    /// Restrict the mask along a branch; references are never narrowed
    pub fn narrow_local_type(&mut self, var: VariableHandle, mask: TypeRefMask) {
        let slot = &mut self.slots[var.index()];
        if !slot.by_ref {
            slot.mask = mask.with_ref(false);
        }
    }

    /// Every variable may now hold anything; used after operations that can
    /// touch arbitrary locals
    pub fn set_all_unknown(&mut self, include_refs: bool) {
        for slot in &mut self.slots {
            slot.by_ref |= include_refs;
            slot.initialized = true;
            slot.less_than_long_max = false;
            slot.mask = TypeRefMask::ANY.with_ref(slot.by_ref);
        }
    }

    /// Join `other` into `self`, returning whether anything changed
    ///
    /// # Panics
    ///
    /// Panics when the states belong to different routines.
    pub fn merge_with(&mut self, other: &FlowState) -> bool {
        assert!(
            self.context == other.context && self.slots.len() == other.slots.len(),
            "cannot merge flow states of different routines ({:?} vs {:?})",
            self.context,
            other.context
        );
        let mut changed = false;
        for (slot, incoming) in self.slots.iter_mut().zip(&other.slots) {
            let before = *slot;
            slot.join(incoming);
            changed |= before != *slot;
        }
        changed
    }

    /// Join of two states
    pub fn merge(mut self, other: &FlowState) -> FlowState {
        self.merge_with(other);
        self
    }

    /// Every slot of `self` is at least as general as in `other`
    pub fn subsumes(&self, other: &FlowState) -> bool {
        self.clone().merge(other) == *self
    }
}
