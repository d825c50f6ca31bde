//! Clock ordering vectors
//!
//! Each case names two clocks and their expected relationship; the checks
//! below assert that exactly one of before / after / equal / concurrent
//! holds for every ordered pair.

use crate::clock::{Causality, VectorClock};

/// One ordering case
pub struct OrderingVector {
    pub name: &'static str,
    pub left: &'static [(&'static str, u64)],
    pub right: &'static [(&'static str, u64)],
    pub expected: Causality,
}

pub const ORDERING_VECTORS: &[OrderingVector] = &[
    OrderingVector {
        name: "both_empty",
        left: &[],
        right: &[],
        expected: Causality::Equal,
    },
    OrderingVector {
        name: "empty_before_any",
        left: &[],
        right: &[("a", 1)],
        expected: Causality::Before,
    },
    OrderingVector {
        name: "same_history",
        left: &[("a", 2), ("b", 1)],
        right: &[("b", 1), ("a", 2)],
        expected: Causality::Equal,
    },
    OrderingVector {
        name: "one_step_ahead",
        left: &[("a", 2), ("b", 1)],
        right: &[("a", 1), ("b", 1)],
        expected: Causality::After,
    },
    OrderingVector {
        name: "extra_replica",
        left: &[("a", 1)],
        right: &[("a", 1), ("b", 1)],
        expected: Causality::Before,
    },
    OrderingVector {
        name: "disjoint_replicas",
        left: &[("a", 1)],
        right: &[("b", 1)],
        expected: Causality::Concurrent,
    },
    OrderingVector {
        name: "crossed_counters",
        left: &[("a", 2), ("b", 1)],
        right: &[("a", 1), ("b", 2)],
        expected: Causality::Concurrent,
    },
    OrderingVector {
        name: "ahead_on_shared_missing_other",
        left: &[("a", 3)],
        right: &[("a", 1), ("b", 1)],
        expected: Causality::Concurrent,
    },
];

fn build(entries: &[(&str, u64)]) -> VectorClock {
    VectorClock::from_entries(entries.iter().map(|(id, c)| (*id, *c)))
}

fn reverse(causality: Causality) -> Causality {
    match causality {
        Causality::Before => Causality::After,
        Causality::After => Causality::Before,
        other => other,
    }
}

#[test]
fn test_ordering_vectors() {
    for case in ORDERING_VECTORS {
        let left = build(case.left);
        let right = build(case.right);
        assert_eq!(left.causality(&right), case.expected, "{}", case.name);
        assert_eq!(right.causality(&left), reverse(case.expected), "{} (reversed)", case.name);
    }
}

#[test]
fn test_exactly_one_relation_holds() {
    let clocks: Vec<VectorClock> = ORDERING_VECTORS
        .iter()
        .flat_map(|case| [build(case.left), build(case.right)])
        .collect();

    for a in &clocks {
        for b in &clocks {
            let holds = [a.less_than(b), b.less_than(a), a == b, a.concurrent(b)];
            assert_eq!(
                holds.iter().filter(|h| **h).count(),
                1,
                "{} vs {}",
                a,
                b
            );
            // Symmetry of equality and concurrency
            assert_eq!(a == b, b == a);
            assert_eq!(a.concurrent(b), b.concurrent(a));
        }
        assert!(!a.less_than(a));
    }
}
