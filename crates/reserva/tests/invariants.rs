//! Property tests: the counter invariants hold across arbitrary operation
//! sequences.

use proptest::prelude::*;

use reserva::{MemoryError, MemoryManager, Protection, ResetPolicy};

#[derive(Debug, Clone)]
enum Op {
    Alloc(usize),
    Append(Vec<u8>),
    Reset(ResetPolicy),
    Protect(Protection),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1usize..16 * 1024).prop_map(Op::Alloc),
        proptest::collection::vec(any::<u8>(), 1..128).prop_map(Op::Append),
        prop_oneof![
            Just(ResetPolicy::Decommit),
            Just(ResetPolicy::KeepAllCommitted),
            Just(ResetPolicy::KeepMinimalCommitted),
        ]
        .prop_map(Op::Reset),
        prop_oneof![Just(Protection::READ), Just(Protection::READ_WRITE)].prop_map(Op::Protect),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn buffer_counters_stay_coherent(ops in proptest::collection::vec(op_strategy(), 1..48)) {
        let manager = MemoryManager::new();
        let mut buffer = manager
            .create_buffer_with_multiplier("prop", 256 * 1024, 1)
            .unwrap();
        let base = buffer.base_ptr();
        let granule = buffer.granule();
        let capacity = buffer.capacity();

        for op in ops {
            let result = match op {
                Op::Alloc(len) => buffer.alloc(len).map(|_| ()),
                Op::Append(bytes) => buffer.append_slice(&bytes).map(|_| ()),
                Op::Reset(policy) => buffer.reset(policy),
                Op::Protect(flags) => buffer.protect(flags),
            };
            if let Err(err) = result {
                // The only runtime failures a well-formed sequence can hit.
                prop_assert!(
                    matches!(
                        err,
                        MemoryError::CapacityExhausted { .. } | MemoryError::NotWritable { .. }
                    ),
                    "unexpected error: {:?}",
                    err
                );
            }

            prop_assert!(buffer.allocated() <= buffer.committed());
            prop_assert!(buffer.committed() <= buffer.capacity());
            prop_assert_eq!(buffer.committed() % granule, 0);
            prop_assert_eq!(buffer.capacity() % granule, 0);
            prop_assert_eq!(buffer.capacity(), capacity);
            prop_assert_eq!(buffer.base_ptr(), base);
            prop_assert_eq!(
                buffer.available(),
                buffer.capacity() - buffer.allocated()
            );
        }

        buffer.dispose();
        prop_assert_eq!(buffer.capacity(), 0);
        prop_assert_eq!(buffer.committed(), 0);
        prop_assert_eq!(buffer.allocated(), 0);
        prop_assert!(buffer.base_ptr().is_null());
    }

    #[test]
    fn typed_len_always_mirrors_allocated(counts in proptest::collection::vec(1usize..512, 1..16)) {
        let manager = MemoryManager::new();
        let mut values = manager.create_array::<u64>("mirror", 1 << 20).unwrap();

        let mut expected = 0usize;
        for count in counts {
            match values.alloc_range(count) {
                Ok((start, span)) => {
                    prop_assert_eq!(start, expected);
                    prop_assert_eq!(span.len(), count);
                    expected += count;
                }
                Err(MemoryError::CapacityExhausted { .. }) => {}
                Err(other) => prop_assert!(false, "unexpected error: {}", other),
            }
            prop_assert_eq!(values.len(), expected);
            prop_assert_eq!(values.allocated(), expected * 8);
        }

        values.reset(ResetPolicy::Decommit).unwrap();
        prop_assert_eq!(values.len(), 0);
    }
}
