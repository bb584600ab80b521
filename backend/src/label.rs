/// A branch target inside the code being emitted.
///
/// Labels support forward references: branches can reference a label
/// before it is placed, and the backend back-patches them when the
/// label is bound.
#[derive(Debug, Clone, Default)]
pub struct Label {
    value: Option<usize>,
    uses: Vec<LabelUse>,
}

/// A forward reference to a label: where a branch displacement was
/// emitted so it can be patched once the label's address is known.
#[derive(Debug, Clone, Copy)]
pub struct LabelUse {
    /// Offset in the code buffer of the displacement field.
    pub offset: usize,
    pub kind: RelocKind,
}

/// Relocation types for label back-patching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocKind {
    /// 32-bit displacement relative to the end of the field.
    Rel32,
}

impl Label {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_use(&mut self, offset: usize, kind: RelocKind) {
        self.uses.push(LabelUse { offset, kind });
    }

    /// Mark the label as placed at `offset`; returns the references
    /// that now need patching.
    pub fn set_value(&mut self, offset: usize) -> Vec<LabelUse> {
        assert!(self.value.is_none(), "label bound twice");
        self.value = Some(offset);
        std::mem::take(&mut self.uses)
    }

    pub fn value(&self) -> Option<usize> {
        self.value
    }

    pub fn is_bound(&self) -> bool {
        self.value.is_some()
    }

    /// Whether there are unresolved forward references.
    pub fn has_pending_uses(&self) -> bool {
        !self.uses.is_empty()
    }
}
