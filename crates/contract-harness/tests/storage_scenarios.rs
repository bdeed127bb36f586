use common::config::StorageConfig;
use contract_harness::{HarnessError, StorageHarness, U256};
use mir::RuntimeFailure;
use test_utils::setup_tracing_with_filter;

fn u(value: u64) -> U256 {
    U256::from(value)
}

fn length(harness: &mut StorageHarness) -> U256 {
    harness.call_word("length_xs", &[]).expect("length never halts")
}

fn assert_halts(result: Result<impl std::fmt::Debug, HarnessError>, expected: RuntimeFailure) {
    match result {
        Err(HarnessError::Halted { failure, .. }) => assert_eq!(failure, expected),
        other => panic!("expected a {expected} halt, got {other:?}"),
    }
}

#[test]
fn grow_to_129_then_shrink_to_5() {
    for element in ["uint256", "uint64", "int16", "uint8"] {
        let mut harness = StorageHarness::compile(&format!("{element}[] xs\n")).unwrap();
        for i in 0..129 {
            harness.call("grow_xs", &[]).unwrap();
            harness.call("write_xs$i", &[u(i), u(i + 1)]).unwrap();
        }
        assert_eq!(length(&mut harness), u(129));
        for _ in 0..124 {
            harness.call("shrink_xs", &[]).unwrap();
        }

        assert_eq!(length(&mut harness), u(5), "{element}");
        for i in 0..5 {
            assert_eq!(harness.call_word("read_xs$i", &[u(i)]).unwrap(), u(i + 1));
        }
        assert_halts(harness.call("read_xs$i", &[u(5)]), RuntimeFailure::OutOfBounds);

        // Growing does not write, so regrown elements expose what shrink left.
        for _ in 5..129 {
            harness.call("grow_xs", &[]).unwrap();
        }
        for i in 5..129 {
            assert_eq!(
                harness.call_word("read_xs$i", &[u(i)]).unwrap(),
                U256::ZERO,
                "{element} element {i} survived shrink"
            );
        }
    }
}

#[test]
fn grow_n_then_shrink_n_leaves_no_storage() {
    let mut harness = StorageHarness::compile("uint8 flag\nuint32[] xs\n").unwrap();
    harness.call("write_flag", &[u(1)]).unwrap();
    for i in 0..20 {
        harness.call("grow_xs", &[]).unwrap();
        harness.call("write_xs$i", &[u(i), u(0xdead_0000 + i)]).unwrap();
    }
    for _ in 0..20 {
        harness.call("shrink_xs", &[]).unwrap();
    }
    assert_eq!(length(&mut harness), U256::ZERO);
    // Only the slot holding `flag` is left.
    assert_eq!(harness.machine().occupied_slots(), 1);
    assert_eq!(harness.call_word("read_flag", &[]).unwrap(), u(1));
}

#[test]
fn popped_element_reads_zero_after_regrow() {
    let mut harness = StorageHarness::compile("uint256[] xs\n").unwrap();
    harness.call("grow_xs", &[]).unwrap();
    harness.call("write_xs$i", &[u(0), u(42)]).unwrap();
    assert_eq!(harness.call_word("read_xs$i", &[u(0)]).unwrap(), u(42));

    harness.call("shrink_xs", &[]).unwrap();
    assert_halts(harness.call("read_xs$i", &[u(0)]), RuntimeFailure::OutOfBounds);

    harness.call("grow_xs", &[]).unwrap();
    assert_eq!(harness.call_word("read_xs$i", &[u(0)]).unwrap(), U256::ZERO);
}

#[test]
fn writing_at_length_halts_without_growing() {
    let mut harness = StorageHarness::compile("uint64[] xs\n").unwrap();
    harness.call("grow_xs", &[]).unwrap();
    harness.call("grow_xs", &[]).unwrap();
    assert_halts(
        harness.call("write_xs$i", &[u(2), u(7)]),
        RuntimeFailure::OutOfBounds,
    );
    assert_eq!(length(&mut harness), u(2));
    assert_halts(
        harness.call("write_xs$i", &[U256::MAX, u(7)]),
        RuntimeFailure::OutOfBounds,
    );
}

#[test]
fn shrinking_an_empty_array_halts() {
    let mut harness = StorageHarness::compile("uint256[] xs\n").unwrap();
    let err = harness.call("shrink_xs", &[]).unwrap_err();
    assert!(err.to_string().contains("0x4e487b71"));
    assert_halts(Err::<(), _>(err), RuntimeFailure::EmptyArrayPop);
    assert_eq!(length(&mut harness), U256::ZERO);
}

#[test]
fn packed_siblings_never_cross_talk() {
    let mut harness =
        StorageHarness::compile("uint8 a\nint16 b\nbool c\naddress d\nuint32 e\n").unwrap();
    let address = U256::from_be_slice(&[0xab; 20]);
    harness.call("write_a", &[u(0xff)]).unwrap();
    harness.call("write_b", &[U256::MAX]).unwrap();
    harness.call("write_c", &[u(1)]).unwrap();
    harness.call("write_d", &[address]).unwrap();
    harness.call("write_e", &[u(0x0102_0304)]).unwrap();

    assert_eq!(harness.call_word("read_a", &[]).unwrap(), u(0xff));
    // Signed values come back sign extended.
    assert_eq!(harness.call_word("read_b", &[]).unwrap(), U256::MAX);
    assert_eq!(harness.call_word("read_c", &[]).unwrap(), u(1));
    assert_eq!(harness.call_word("read_d", &[]).unwrap(), address);
    assert_eq!(harness.call_word("read_e", &[]).unwrap(), u(0x0102_0304));

    harness.call("write_b", &[u(3)]).unwrap();
    harness.call("write_c", &[U256::ZERO]).unwrap();
    assert_eq!(harness.call_word("read_a", &[]).unwrap(), u(0xff));
    assert_eq!(harness.call_word("read_b", &[]).unwrap(), u(3));
    assert_eq!(harness.call_word("read_d", &[]).unwrap(), address);
    assert_eq!(harness.call_word("read_e", &[]).unwrap(), u(0x0102_0304));
}

#[test]
fn oversized_values_are_narrowed_on_write() {
    let mut harness = StorageHarness::compile("uint8 a\nuint8 b\n").unwrap();
    harness.call("write_a", &[u(0x1ff)]).unwrap();
    assert_eq!(harness.call_word("read_a", &[]).unwrap(), u(0xff));
    assert_eq!(harness.call_word("read_b", &[]).unwrap(), U256::ZERO);
}

#[test]
fn mapping_entries_are_independent() {
    let mut harness = StorageHarness::compile("mapping(address => uint128[]) lists\n").unwrap();
    let (alice, bob) = (u(0xa11ce), u(0xb0b));
    harness.call("grow_lists$k", &[alice]).unwrap();
    harness.call("write_lists$k$i", &[alice, u(0), u(11)]).unwrap();
    harness.call("grow_lists$k", &[bob]).unwrap();
    harness.call("grow_lists$k", &[bob]).unwrap();
    harness.call("write_lists$k$i", &[bob, u(1), u(22)]).unwrap();

    assert_eq!(harness.call_word("length_lists$k", &[alice]).unwrap(), u(1));
    assert_eq!(harness.call_word("length_lists$k", &[bob]).unwrap(), u(2));
    assert_eq!(harness.call_word("read_lists$k$i", &[alice, u(0)]).unwrap(), u(11));
    assert_eq!(harness.call_word("read_lists$k$i", &[bob, u(0)]).unwrap(), U256::ZERO);
    assert_eq!(harness.call_word("read_lists$k$i", &[bob, u(1)]).unwrap(), u(22));
    assert_halts(
        harness.call("read_lists$k$i", &[alice, u(1)]),
        RuntimeFailure::OutOfBounds,
    );
}

#[test]
fn clear_zeroes_nested_arrays() {
    let mut harness =
        StorageHarness::compile("struct { uint64 n; uint8[] tags; uint256[2] pair; } s\n").unwrap();
    harness.call("write_s.n", &[u(9)]).unwrap();
    for i in 0..40 {
        harness.call("grow_s.tags", &[]).unwrap();
        harness.call("write_s.tags$i", &[u(i), u(i + 1)]).unwrap();
    }
    harness.call("write_s.pair$i", &[u(1), u(5)]).unwrap();
    assert!(harness.machine().occupied_slots() > 3);

    harness.call("clear_s", &[]).unwrap();
    assert_eq!(harness.machine().occupied_slots(), 0);
    assert_eq!(harness.call_word("length_s.tags", &[]).unwrap(), U256::ZERO);
    assert_eq!(harness.call_word("length_s.pair", &[]).unwrap(), u(2));
}

#[test]
fn fresh_writes_cost_more_than_overwrites() {
    let mut harness = StorageHarness::compile("uint256 a\n").unwrap();
    let fresh = harness.call("write_a", &[u(5)]).unwrap();
    let overwrite = harness.call("write_a", &[u(6)]).unwrap();
    assert_eq!(fresh.gas_used, 22_100);
    assert_eq!(overwrite.gas_used, 5_000);
}

#[test]
fn shrink_earns_a_capped_refund() {
    let mut cancun = StorageHarness::compile("uint256[] xs\n").unwrap();
    let berlin_config = StorageConfig::parse("[storage]\ncost-schedule = \"berlin\"\n").unwrap();
    let mut berlin = StorageHarness::compile_with_config("uint256[] xs\n", &berlin_config).unwrap();

    let mut refunds = Vec::new();
    for harness in [&mut cancun, &mut berlin] {
        harness.call("grow_xs", &[]).unwrap();
        harness.call("write_xs$i", &[u(0), u(7)]).unwrap();
        let shrink = harness.call("shrink_xs", &[]).unwrap();
        assert!(shrink.refund > 0);
        refunds.push(shrink.refund);
    }
    assert!(refunds[1] > refunds[0]);
}

#[test]
fn out_of_gas_leaves_the_array_intact() {
    let _guard = setup_tracing_with_filter("harness=debug");
    let mut harness = StorageHarness::compile("uint256[] xs\n").unwrap();
    for i in 0..10 {
        harness.call("grow_xs", &[]).unwrap();
        harness.call("write_xs$i", &[u(i), u(1)]).unwrap();
    }
    let err = harness
        .call_with_options(
            "clear_xs",
            &[],
            contract_harness::ExecutionOptions { gas_limit: 20_000 },
        )
        .unwrap_err();
    assert!(matches!(err, HarnessError::OutOfGas { limit: 20_000 }));
    assert_eq!(length(&mut harness), u(10));
    assert_eq!(harness.call_word("read_xs$i", &[u(9)]).unwrap(), u(1));
}

#[test]
fn underscored_field_is_distinct_from_array_elements() {
    let mut harness = StorageHarness::compile("uint8[2] a\nuint8 a_i\n").unwrap();
    harness.call("write_a_i", &[u(7)]).unwrap();
    harness.call("write_a$i", &[u(1), u(9)]).unwrap();

    assert_eq!(harness.call_word("read_a_i", &[]).unwrap(), u(7));
    assert_eq!(harness.call_word("read_a$i", &[u(0)]).unwrap(), U256::ZERO);
    assert_eq!(harness.call_word("read_a$i", &[u(1)]).unwrap(), u(9));

    let yul = codegen::emit_accessors_yul(&harness.program().accessors).unwrap();
    assert_eq!(yul.matches("function write_a_i(").count(), 1);
    assert_eq!(yul.matches("function write_a$i(").count(), 1);
}
