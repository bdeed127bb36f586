use mir::ValueId;
use rustc_hash::FxHashSet;

/// Tracks which accessor values are in scope within a Yul block.
///
/// Loop bodies work on a clone so that values defined inside a `for` body do
/// not leak into the enclosing block, matching Yul scoping.
#[derive(Clone, Default)]
pub(super) struct BlockState {
    defined: FxHashSet<ValueId>,
}

impl BlockState {
    /// Creates a fresh state with no values registered.
    pub(super) fn new() -> Self {
        Self::default()
    }

    /// Registers `value` and returns its Yul name.
    pub(super) fn define(&mut self, value: ValueId) -> String {
        self.defined.insert(value);
        local_name(value)
    }

    /// Returns the Yul name of `value` if it is in scope.
    pub(super) fn resolve(&self, value: ValueId) -> Option<String> {
        self.defined.contains(&value).then(|| local_name(value))
    }
}

pub(super) fn local_name(value: ValueId) -> String {
    format!("v{}", value.0)
}
