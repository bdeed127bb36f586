//! Reference interpreter for accessor operation sequences.
//!
//! Storage is a sparse map of words; absent slots read zero. Every call is
//! one transaction: stores are buffered and only committed when the accessor
//! returns, so a halt leaves storage exactly as it was.

use alloy_primitives::{U256, keccak256};
use mir::{
    Access, Accessor, CostModel, Operand, RuntimeFailure, StorageOp, ValueId,
    cost::LOOP_ITERATION_GAS,
    ir::sign_extend,
};
use revm::interpreter::Gas;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{CallResult, ExecutionOptions, HarnessError, RevertData};

/// Persistent word storage plus the cost schedule calls are priced with.
#[derive(Debug, Clone, Default)]
pub struct StorageMachine {
    storage: FxHashMap<U256, U256>,
    cost: CostModel,
}

impl StorageMachine {
    pub fn new(cost: CostModel) -> Self {
        Self {
            storage: FxHashMap::default(),
            cost,
        }
    }

    pub fn cost_model(&self) -> &CostModel {
        &self.cost
    }

    /// Committed value of `slot`.
    pub fn load(&self, slot: U256) -> U256 {
        self.storage.get(&slot).copied().unwrap_or_default()
    }

    /// Number of slots currently holding a nonzero word.
    pub fn occupied_slots(&self) -> usize {
        self.storage.len()
    }

    /// Runs `accessor` with `args` bound to its params in order.
    pub fn execute(
        &mut self,
        accessor: &Accessor,
        args: &[U256],
        options: ExecutionOptions,
    ) -> Result<CallResult, HarnessError> {
        if args.len() != accessor.params.len() {
            return Err(HarnessError::Arity {
                accessor: accessor.name.clone(),
                expected: accessor.params.len(),
                found: args.len(),
            });
        }

        let mut tx = Transaction {
            committed: &self.storage,
            cost: &self.cost,
            accessor,
            values: vec![None; accessor.value_count() as usize],
            dirty: FxHashMap::default(),
            warm: FxHashSet::default(),
            meter: Gas::new(options.gas_limit),
        };
        for (param, arg) in accessor.params.iter().zip(args) {
            tx.define(param.value, *arg);
        }

        match tx.run(&accessor.body).and_then(|()| tx.returns()) {
            Ok(returns) => {
                let refund = self.cost.finalize_refund(&mut tx.meter);
                let gas_used = tx.meter.spent() - refund;
                let dirty = tx.dirty;
                for (slot, value) in dirty {
                    if value.is_zero() {
                        self.storage.remove(&slot);
                    } else {
                        self.storage.insert(slot, value);
                    }
                }
                tracing::debug!(
                    target: "harness",
                    accessor = %accessor.name,
                    gas_used,
                    refund,
                    "call succeeded"
                );
                Ok(CallResult {
                    returns,
                    gas_used,
                    refund,
                })
            }
            Err(err) => {
                tracing::debug!(
                    target: "harness",
                    accessor = %accessor.name,
                    "call reverted: {err}"
                );
                Err(err)
            }
        }
    }
}

struct Transaction<'a> {
    committed: &'a FxHashMap<U256, U256>,
    cost: &'a CostModel,
    accessor: &'a Accessor,
    values: Vec<Option<U256>>,
    /// Slots written during this call, with their latest value.
    dirty: FxHashMap<U256, U256>,
    warm: FxHashSet<U256>,
    meter: Gas,
}

impl Transaction<'_> {
    fn run(&mut self, ops: &[StorageOp]) -> Result<(), HarnessError> {
        for op in ops {
            self.step(op)?;
        }
        Ok(())
    }

    fn step(&mut self, op: &StorageOp) -> Result<(), HarnessError> {
        match op {
            StorageOp::Sload { dest, slot } => {
                let slot = self.eval(*slot)?;
                let access = self.touch(slot);
                self.charge(self.cost.sload(access))?;
                let value = self.current(slot);
                self.define(*dest, value);
            }
            StorageOp::Sstore { slot, value } => {
                let slot = self.eval(*slot)?;
                let value = self.eval(*value)?;
                let access = self.touch(slot);
                let original = self.committed.get(&slot).copied().unwrap_or_default();
                let priced = self.cost.sstore(original, self.current(slot), value, access);
                self.charge(priced.gas)?;
                self.meter.record_refund(priced.refund);
                self.dirty.insert(slot, value);
            }
            StorageOp::Keccak { dest, words } => {
                self.charge(self.cost.keccak(words.len() as u64))?;
                let mut preimage = Vec::with_capacity(words.len() * 32);
                for word in words {
                    preimage.extend_from_slice(&self.eval(*word)?.to_be_bytes::<32>());
                }
                self.define(*dest, U256::from_be_bytes(keccak256(&preimage).0));
            }
            StorageOp::Bin { dest, op, lhs, rhs } => {
                self.charge(self.cost.bin(*op))?;
                let value = op.apply(self.eval(*lhs)?, self.eval(*rhs)?);
                self.define(*dest, value);
            }
            StorageOp::Un { dest, op, arg } => {
                self.charge(self.cost.unary())?;
                let value = op.apply(self.eval(*arg)?);
                self.define(*dest, value);
            }
            StorageOp::SignExtend { dest, byte, arg } => {
                self.charge(self.cost.sign_extend())?;
                let value = sign_extend(*byte, self.eval(*arg)?);
                self.define(*dest, value);
            }
            StorageOp::Check { cond, failure } => {
                self.charge(self.cost.check())?;
                if self.eval(*cond)?.is_zero() {
                    return Err(self.halt(*failure));
                }
            }
            StorageOp::Loop { index, count, body } => {
                let count = self.eval(*count)?;
                let mut trip = U256::ZERO;
                while trip < count {
                    self.charge(LOOP_ITERATION_GAS)?;
                    self.define(*index, trip);
                    self.run(body)?;
                    trip += U256::from(1);
                }
            }
        }
        Ok(())
    }

    fn returns(&self) -> Result<Vec<U256>, HarnessError> {
        self.accessor
            .returns
            .iter()
            .map(|operand| self.eval(*operand))
            .collect()
    }

    fn eval(&self, operand: Operand) -> Result<U256, HarnessError> {
        match operand {
            Operand::Const(value) => Ok(value),
            Operand::Value(value) => self
                .values
                .get(value.index())
                .copied()
                .flatten()
                .ok_or_else(|| HarnessError::UndefinedValue {
                    accessor: self.accessor.name.clone(),
                    value,
                }),
        }
    }

    fn define(&mut self, value: ValueId, word: U256) {
        self.values[value.index()] = Some(word);
    }

    fn current(&self, slot: U256) -> U256 {
        self.dirty
            .get(&slot)
            .or_else(|| self.committed.get(&slot))
            .copied()
            .unwrap_or_default()
    }

    fn touch(&mut self, slot: U256) -> Access {
        if self.warm.insert(slot) {
            Access::Cold
        } else {
            Access::Warm
        }
    }

    fn charge(&mut self, gas: u64) -> Result<(), HarnessError> {
        if !self.meter.record_cost(gas) {
            return Err(HarnessError::OutOfGas {
                limit: self.meter.limit(),
            });
        }
        Ok(())
    }

    fn halt(&self, failure: RuntimeFailure) -> HarnessError {
        HarnessError::Halted {
            failure,
            data: RevertData::panic(failure),
            gas_used: self.meter.spent(),
        }
    }
}

#[cfg(test)]
mod tests {
    use mir::{AccessPath, AccessorKind, allocate, lower_accessor, parse_field_decls};

    use super::*;

    fn accessor(decls: &str, path: AccessPath, kind: AccessorKind) -> Accessor {
        let layouts = allocate(&parse_field_decls("machine.fe", decls).unwrap()).unwrap();
        lower_accessor(&layouts, &path, kind).unwrap()
    }

    #[test]
    fn halted_calls_leave_storage_untouched() {
        let grow = accessor("uint256[] xs\n", AccessPath::root("xs"), AccessorKind::Grow);
        let write = accessor("uint256[] xs\n", AccessPath::root("xs").index(), AccessorKind::Write);
        let mut machine = StorageMachine::default();
        machine.execute(&grow, &[], ExecutionOptions::default()).unwrap();
        let before = machine.storage.clone();

        let err = machine
            .execute(&write, &[U256::from(1), U256::from(9)], ExecutionOptions::default())
            .unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Halted {
                failure: RuntimeFailure::OutOfBounds,
                ..
            }
        ));
        assert_eq!(machine.storage, before);
    }

    #[test]
    fn running_out_of_gas_reverts() {
        let write = accessor("uint256 a\n", AccessPath::root("a"), AccessorKind::Write);
        let mut machine = StorageMachine::default();
        let err = machine
            .execute(&write, &[U256::from(5)], ExecutionOptions { gas_limit: 1_000 })
            .unwrap_err();
        assert!(matches!(err, HarnessError::OutOfGas { limit: 1_000 }));
        assert_eq!(machine.load(U256::ZERO), U256::ZERO);
    }

    #[test]
    fn clearing_refund_is_capped_at_a_fifth_of_the_gas_spent() {
        let write = accessor("uint256 a\n", AccessPath::root("a"), AccessorKind::Write);
        let mut machine = StorageMachine::default();
        let set = machine
            .execute(&write, &[U256::from(7)], ExecutionOptions::default())
            .unwrap();
        assert_eq!(set.gas_used, 22_100);
        assert_eq!(set.refund, 0);

        let cleared = machine
            .execute(&write, &[U256::ZERO], ExecutionOptions::default())
            .unwrap();
        // 5000 spent, 4800 earned, 1000 granted.
        assert_eq!(cleared.refund, 1_000);
        assert_eq!(cleared.gas_used, 4_000);
        assert_eq!(machine.occupied_slots(), 0);
    }

    #[test]
    fn argument_count_is_checked() {
        let read = accessor("uint8[2] row\n", AccessPath::root("row").index(), AccessorKind::Read);
        let err = StorageMachine::default()
            .execute(&read, &[], ExecutionOptions::default())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "`read_row$i` expects 1 argument(s), got 0"
        );
    }

    #[test]
    fn charges_match_the_static_estimate_for_straight_line_code() {
        let write = accessor("uint8 a\nuint8 b\n", AccessPath::root("b"), AccessorKind::Write);
        let mut machine = StorageMachine::default();
        let result = machine
            .execute(&write, &[U256::from(7)], ExecutionOptions::default())
            .unwrap();
        assert_eq!(result.gas_used, machine.cost_model().estimate(&write, 0));
        assert_eq!(machine.load(U256::ZERO), U256::from(7) << 8);
    }
}
