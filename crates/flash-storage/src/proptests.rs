use crate::{FlashDevice, MemFlash, SparseConfig, SparseFlash, FILL_BYTE};
use proptest::prelude::*;
use proptest::test_runner::TestCaseResult;

#[derive(Debug, Clone)]
enum Op {
    Write { offset: u32, data: Vec<u8> },
    Read { offset: u32, len: usize },
    Erase { offset: u32, len: u32 },
}

const MAX_DEVICE_SIZE: u32 = 16 * 1024;
const MAX_OPS: usize = 64;
const MAX_RW_LEN: usize = 512;

// Slotted scenarios place every write inside its own slot, leaving a gap before the next one.
const SLOT_SIZE: u32 = 64;

fn device_size_strategy() -> impl Strategy<Value = u32> {
    1u32..=MAX_DEVICE_SIZE
}

fn offset_strategy(size: u32) -> BoxedStrategy<u32> {
    let any = 0u32..=size;
    let near_end = (0u32..=64).prop_map(move |delta| size.saturating_sub(delta));
    // Small offsets make writes pile onto the same chunks.
    let clustered = 0u32..=size.min(256);

    prop_oneof![
        3 => any,
        3 => clustered,
        1 => near_end,
    ]
    .boxed()
}

fn write_op_strategy(size: u32) -> BoxedStrategy<Op> {
    offset_strategy(size)
        .prop_flat_map(move |offset| {
            let max_len = ((size - offset) as usize).min(MAX_RW_LEN);
            (Just(offset), prop::collection::vec(any::<u8>(), 0..=max_len))
        })
        .prop_map(|(offset, data)| Op::Write { offset, data })
        .boxed()
}

fn read_op_strategy(size: u32) -> BoxedStrategy<Op> {
    offset_strategy(size)
        .prop_flat_map(move |offset| {
            let max_len = ((size - offset) as usize).min(MAX_RW_LEN * 2);
            (Just(offset), 0usize..=max_len)
        })
        .prop_map(|(offset, len)| Op::Read { offset, len })
        .boxed()
}

fn erase_op_strategy(size: u32) -> BoxedStrategy<Op> {
    offset_strategy(size)
        .prop_flat_map(move |offset| {
            let max_len = (size - offset).min(MAX_RW_LEN as u32);
            (Just(offset), 0u32..=max_len)
        })
        .prop_map(|(offset, len)| Op::Erase { offset, len })
        .boxed()
}

fn ops_strategy(size: u32) -> BoxedStrategy<Vec<Op>> {
    let op = prop_oneof![
        5 => write_op_strategy(size),
        4 => read_op_strategy(size),
        2 => erase_op_strategy(size),
    ];
    prop::collection::vec(op, 1..=MAX_OPS).boxed()
}

fn scenario_strategy() -> BoxedStrategy<(u32, Vec<Op>)> {
    device_size_strategy()
        .prop_flat_map(|size| (Just(size), ops_strategy(size)))
        .boxed()
}

fn slotted_ops_strategy(slots: u32) -> BoxedStrategy<Vec<Op>> {
    let write = (0..slots, 1usize..SLOT_SIZE as usize)
        .prop_flat_map(|(slot, len)| (Just(slot), prop::collection::vec(any::<u8>(), len)))
        .prop_map(|(slot, data)| Op::Write {
            offset: slot * SLOT_SIZE,
            data,
        });
    let read = (0..slots, 0..=SLOT_SIZE * 2).prop_map(move |(slot, len)| Op::Read {
        offset: slot * SLOT_SIZE,
        len: len.min((slots - slot) * SLOT_SIZE) as usize,
    });
    let erase = (0..slots, 0..=3u32).prop_map(move |(slot, count)| Op::Erase {
        offset: slot * SLOT_SIZE,
        len: count.min(slots - slot) * SLOT_SIZE,
    });
    let op = prop_oneof![5 => write, 4 => read, 2 => erase];
    prop::collection::vec(op, 1..=MAX_OPS).boxed()
}

fn slotted_scenario_strategy() -> BoxedStrategy<(u32, Vec<Op>)> {
    (1u32..=64)
        .prop_flat_map(|slots| (Just(slots * SLOT_SIZE), slotted_ops_strategy(slots)))
        .boxed()
}

fn run_ops<D, Check>(mut device: D, ops: &[Op], mut check: Check) -> TestCaseResult
where
    D: FlashDevice,
    Check: FnMut(&D),
{
    let capacity = device.size() as usize;
    let mut model = vec![FILL_BYTE; capacity];

    for op in ops {
        match op {
            Op::Write { offset, data } => {
                let offset = *offset as usize;
                device.write(data, offset as u64).unwrap();
                model[offset..offset + data.len()].copy_from_slice(data);

                let read_back = device.read(offset as u64, data.len()).unwrap();
                prop_assert_eq!(read_back.as_slice(), data.as_slice());
            }
            Op::Read { offset, len } => {
                let offset = *offset as usize;
                let buf = device.read(offset as u64, *len).unwrap();
                prop_assert_eq!(buf.as_slice(), &model[offset..offset + len]);
            }
            Op::Erase { offset, len } => {
                let offset = *offset as usize;
                let len = *len as usize;
                device.erase(offset as u64, len as u64).unwrap();
                model[offset..offset + len].fill(FILL_BYTE);

                let erased = device.read(offset as u64, len).unwrap();
                prop_assert!(erased.iter().all(|b| *b == FILL_BYTE));
            }
        }
        check(&device);
    }

    let all = device.read(0, capacity).unwrap();
    prop_assert_eq!(all.as_slice(), model.as_slice());

    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_mem_flash_matches_reference((size, ops) in scenario_strategy()) {
        let device = MemFlash::new(size as u64).unwrap();
        run_ops(device, &ops, |_| {})?;
    }

    #[test]
    fn prop_exact_sparse_flash_matches_reference((size, ops) in scenario_strategy()) {
        let device = SparseFlash::with_config(size as u64, SparseConfig::exact());
        run_ops(device, &ops, |device| device.assert_invariants())?;
    }

    #[test]
    fn prop_sparse_flash_matches_reference_for_separated_writes((size, ops) in slotted_scenario_strategy()) {
        let device = SparseFlash::new(size as u64);
        run_ops(device, &ops, |device| device.assert_invariants())?;
    }

    #[test]
    fn prop_sparse_flash_keeps_chunks_in_bounds((size, ops) in scenario_strategy()) {
        let mut device = SparseFlash::new(size as u64);
        for op in &ops {
            match op {
                Op::Write { offset, data } => device.write(data, *offset as u64).unwrap(),
                Op::Read { offset, len } => {
                    prop_assert_eq!(device.read(*offset as u64, *len).unwrap().len(), *len);
                }
                Op::Erase { offset, len } => device.erase(*offset as u64, *len as u64).unwrap(),
            }
            device.assert_invariants();
        }
    }
}
