//! Storage-machine cost schedule.
//!
//! Prices come from `revm`'s gas tables for the selected hardfork: EIP-2929
//! access lists (cold/warm), EIP-2200 net-metered stores, and the clear
//! refund as lowered by EIP-3529 from London on.

use alloy_primitives::U256;
use common::config::DEFAULT_COST_SCHEDULE;
use revm::interpreter::{Gas, SStoreResult, gas};
use revm::primitives::hardfork::SpecId;
use rustc_hash::FxHashSet;

use crate::ir::{Accessor, BinOp, Operand, StorageOp};

/// Memory write staging one hashed word in scratch space.
pub const MSTORE_GAS: u64 = gas::VERYLOW;
pub const JUMPI_GAS: u64 = gas::HIGH;
/// Counter compare, branch, increment and back jump of one loop iteration.
pub const LOOP_ITERATION_GAS: u64 =
    gas::VERYLOW + gas::VERYLOW + JUMPI_GAS + gas::VERYLOW + gas::MID;

/// Whether a slot was already touched in the current execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    Cold,
    Warm,
}

impl Access {
    fn is_cold(self) -> bool {
        self == Access::Cold
    }
}

/// Gas charged for one store and the refund it earns. Refunds may be negative
/// when a store undoes an earlier clear in the same execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SstoreCost {
    pub gas: u64,
    pub refund: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostModel {
    spec: SpecId,
}

impl Default for CostModel {
    fn default() -> Self {
        Self::for_spec(DEFAULT_COST_SCHEDULE)
    }
}

impl CostModel {
    pub fn for_spec(spec: SpecId) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> SpecId {
        self.spec
    }

    pub fn sload(&self, access: Access) -> u64 {
        gas::sload_cost(self.spec, access.is_cold())
    }

    /// Prices `storage[slot] = new` given the value at the start of the
    /// execution (`original`) and right before the store (`current`).
    pub fn sstore(&self, original: U256, current: U256, new: U256, access: Access) -> SstoreCost {
        let vals = SStoreResult {
            original_value: original,
            present_value: current,
            new_value: new,
        };
        SstoreCost {
            gas: gas::sstore_cost(self.spec, &vals, access.is_cold()),
            refund: gas::sstore_refund(self.spec, &vals),
        }
    }

    /// Hashing `words` scratch words, including the stores that stage them.
    pub fn keccak(&self, words: u64) -> u64 {
        gas::KECCAK256 + words * (gas::KECCAK256WORD + MSTORE_GAS)
    }

    pub fn bin(&self, op: BinOp) -> u64 {
        match op {
            BinOp::Mul | BinOp::Div | BinOp::Mod => gas::LOW,
            BinOp::Add
            | BinOp::Sub
            | BinOp::And
            | BinOp::Or
            | BinOp::Shl
            | BinOp::Shr
            | BinOp::Lt => gas::VERYLOW,
        }
    }

    /// A check is an `iszero` feeding a conditional jump.
    pub fn check(&self) -> u64 {
        gas::VERYLOW + JUMPI_GAS
    }

    pub fn unary(&self) -> u64 {
        gas::VERYLOW
    }

    pub fn sign_extend(&self) -> u64 {
        gas::LOW
    }

    /// Caps the refund accumulated in `meter` at the fork's quotient of the gas
    /// spent and returns the refund granted.
    pub fn finalize_refund(&self, meter: &mut Gas) -> u64 {
        if meter.refunded() <= 0 {
            return 0;
        }
        meter.set_final_refund(self.spec.is_enabled_in(SpecId::LONDON));
        meter.refunded() as u64
    }

    /// Worst-case gas of one execution of `accessor`: every first access is
    /// cold, every store writes a previously empty slot, and loops whose trip
    /// count is only known at runtime run `dynamic_trip_count` times.
    pub fn estimate(&self, accessor: &Accessor, dynamic_trip_count: u64) -> u64 {
        let mut warm = FxHashSet::default();
        self.estimate_ops(&accessor.body, dynamic_trip_count, &mut warm)
    }

    fn estimate_ops(
        &self,
        ops: &[StorageOp],
        dynamic_trip_count: u64,
        warm: &mut FxHashSet<Operand>,
    ) -> u64 {
        let mut total: u64 = 0;
        for op in ops {
            let cost = match op {
                StorageOp::Sload { slot, .. } => self.sload(touch(warm, *slot)),
                StorageOp::Sstore { slot, .. } => {
                    let access = touch(warm, *slot);
                    self.sstore(U256::ZERO, U256::ZERO, U256::from(1), access).gas
                }
                StorageOp::Keccak { words, .. } => self.keccak(words.len() as u64),
                StorageOp::Bin { op, .. } => self.bin(*op),
                StorageOp::Un { .. } => self.unary(),
                StorageOp::SignExtend { .. } => self.sign_extend(),
                StorageOp::Check { .. } => self.check(),
                StorageOp::Loop { count, body, .. } => {
                    let trips = match count.as_const() {
                        Some(count) => count.saturating_to::<u64>(),
                        None => dynamic_trip_count,
                    };
                    // Slots inside a loop body change every iteration.
                    let mut body_warm = warm.clone();
                    let per_trip = self.estimate_ops(body, dynamic_trip_count, &mut body_warm)
                        + LOOP_ITERATION_GAS;
                    per_trip.saturating_mul(trips)
                }
            };
            total = total.saturating_add(cost);
        }
        total
    }
}

fn touch(warm: &mut FxHashSet<Operand>, slot: Operand) -> Access {
    if warm.insert(slot) {
        Access::Cold
    } else {
        Access::Warm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::allocate;
    use crate::ir::{AccessPath, AccessorKind};
    use crate::lower::lower_accessor;
    use crate::ty::parse_field_decls;

    fn u(value: u64) -> U256 {
        U256::from(value)
    }

    #[test]
    fn writing_an_untouched_word_costs_more_than_overwriting() {
        let model = CostModel::default();
        let fresh = model.sstore(u(0), u(0), u(7), Access::Cold);
        let overwrite = model.sstore(u(3), u(3), u(7), Access::Cold);
        assert_eq!(fresh.gas, 22_100);
        assert_eq!(overwrite.gas, 5_000);
        assert!(fresh.gas > overwrite.gas);
    }

    #[test]
    fn prices_follow_the_selected_hardfork() {
        for spec in [SpecId::BERLIN, SpecId::LONDON, SpecId::CANCUN, SpecId::PRAGUE] {
            let model = CostModel::for_spec(spec);
            assert_eq!(model.spec(), spec);
            assert_eq!(model.sload(Access::Cold), gas::COLD_SLOAD_COST);
            assert_eq!(model.sload(Access::Warm), gas::WARM_STORAGE_READ_COST);
            let fresh = model.sstore(u(0), u(0), u(1), Access::Cold);
            assert_eq!(fresh.gas, gas::SSTORE_SET + gas::COLD_SLOAD_COST);
        }
        assert_eq!(CostModel::default().spec(), DEFAULT_COST_SCHEDULE);
        assert_eq!(CostModel::default().keccak(2), 30 + 2 * (6 + 3));
    }

    #[test]
    fn clearing_a_nonzero_word_is_refunded() {
        let london = CostModel::for_spec(SpecId::LONDON);
        let berlin = CostModel::for_spec(SpecId::BERLIN);
        assert_eq!(london.sstore(u(5), u(5), u(0), Access::Warm).refund, 4_800);
        assert_eq!(berlin.sstore(u(5), u(5), u(0), Access::Warm).refund, 15_000);
        assert_eq!(london.sstore(u(0), u(0), u(0), Access::Warm).refund, 0);
    }

    #[test]
    fn net_metering_of_dirty_slots() {
        let model = CostModel::for_spec(SpecId::CANCUN);
        // Set then reset within one execution.
        let undo = model.sstore(u(0), u(9), u(0), Access::Warm);
        assert_eq!(undo, SstoreCost { gas: 100, refund: 19_900 });
        // Cleared then written again: the clear refund is taken back.
        let rewrite = model.sstore(u(4), u(0), u(6), Access::Warm);
        assert_eq!(rewrite, SstoreCost { gas: 100, refund: -4_800 });
        let restore = model.sstore(u(4), u(0), u(4), Access::Warm);
        assert_eq!(restore.refund, -4_800 + 2_800);
        assert_eq!(model.sstore(u(4), u(4), u(4), Access::Cold).gas, 2_200);
    }

    #[test]
    fn refunds_are_capped() {
        let london = CostModel::for_spec(SpecId::LONDON);
        let berlin = CostModel::for_spec(SpecId::BERLIN);
        let granted = |model: CostModel, refund: i64| {
            let mut meter = Gas::new(10_000);
            assert!(meter.record_cost(10_000));
            meter.record_refund(refund);
            model.finalize_refund(&mut meter)
        };
        assert_eq!(granted(london, 4_800), 2_000);
        assert_eq!(granted(berlin, 4_800), 4_800);
        assert_eq!(granted(london, -5), 0);
    }

    #[test]
    fn estimates_reuse_warm_slots() {
        let decls = parse_field_decls("cost.fe", "uint8 a\nuint8 b\nuint256 c\n").unwrap();
        let layouts = allocate(&decls).unwrap();
        let model = CostModel::default();
        let packed = lower_accessor(&layouts, &AccessPath::root("b"), AccessorKind::Write).unwrap();
        let full = lower_accessor(&layouts, &AccessPath::root("c"), AccessorKind::Write).unwrap();
        // The store after the load hits a warm slot.
        let packed_storage = gas::COLD_SLOAD_COST + gas::SSTORE_SET;
        assert!(model.estimate(&packed, 0) > packed_storage);
        assert!(model.estimate(&packed, 0) < packed_storage + gas::COLD_SLOAD_COST);
        assert_eq!(model.estimate(&full, 0), gas::SSTORE_SET + gas::COLD_SLOAD_COST);
    }

    #[test]
    fn dynamic_loops_scale_with_the_assumed_trip_count() {
        let decls = parse_field_decls("cost.fe", "uint256[] xs\n").unwrap();
        let layouts = allocate(&decls).unwrap();
        let clear = lower_accessor(&layouts, &AccessPath::root("xs"), AccessorKind::Clear).unwrap();
        let model = CostModel::default();
        assert!(model.estimate(&clear, 10) > model.estimate(&clear, 1));
    }
}
