//! Property-based tests for the stream queue.
//! Checks the queue against a `VecDeque` model for arbitrary push/pop sequences.

#![allow(clippy::arithmetic_side_effects, clippy::cast_possible_truncation)]

use std::collections::VecDeque;

use proptest::prelude::*;
use smi_stream::StreamQueue;

#[derive(Debug, Clone)]
enum Op {
    Push(usize),
    Pop(usize),
    Reset,
    Discard,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0usize..48).prop_map(Op::Push),
        4 => (0usize..48).prop_map(Op::Pop),
        1 => Just(Op::Reset),
        1 => Just(Op::Discard),
    ]
}

proptest! {
    /// space + data == capacity after every operation, and pop returns
    /// exactly the bytes pushed and not yet popped, in order.
    #[test]
    fn queue_matches_fifo_model(capacity in 0usize..64, ops in prop::collection::vec(op(), 0..128)) {
        let mut q = StreamQueue::with_capacity(capacity).expect("small allocation");
        let mut model: VecDeque<u8> = VecDeque::new();
        let mut next: u8 = 0;

        for op in ops {
            match op {
                Op::Push(len) => {
                    let data: Vec<u8> = (0..len).map(|i| next.wrapping_add(i as u8)).collect();
                    let accepted = q.push(&data);
                    prop_assert_eq!(accepted, len.min(capacity - model.len()));
                    model.extend(&data[..accepted]);
                    next = next.wrapping_add(accepted as u8);
                }
                Op::Pop(len) => {
                    let mut out = vec![0u8; len];
                    let n = q.pop(&mut out);
                    prop_assert_eq!(n, len.min(model.len()));
                    let expected: Vec<u8> = model.drain(..n).collect();
                    prop_assert_eq!(&out[..n], &expected[..]);
                }
                Op::Reset => {
                    q.reset();
                    model.clear();
                }
                Op::Discard => {
                    q.discard_pending();
                    model.clear();
                }
            }
            prop_assert_eq!(q.available_data() + q.available_space(), q.capacity());
            prop_assert_eq!(q.available_data(), model.len());
        }
    }

    /// Whole-unit pushes and pops never split a unit across reads.
    #[test]
    fn unit_sized_traffic_stays_unit_aligned(units in 2usize..8, ops in prop::collection::vec(any::<bool>(), 0..64)) {
        const UNIT: usize = 16;
        let mut q = StreamQueue::with_capacity(units * UNIT).expect("small allocation");
        for push in ops {
            if push {
                if q.available_space() >= UNIT {
                    prop_assert_eq!(q.push(&[0xAB; UNIT]), UNIT);
                }
            } else {
                let mut out = [0u8; UNIT];
                let n = q.pop(&mut out);
                prop_assert!(n == 0 || n == UNIT);
            }
            prop_assert_eq!(q.available_data() % UNIT, 0);
        }
    }
}
