//! Vector clocks for causal versioning of stored values
//!
//! A clock maps replica ids to event counters. An id that is absent from
//! the map has counter zero, and clocks never hold an explicit zero, so two
//! clocks describing the same history always compare equal.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Causal relationship of one clock to another
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Causality {
    /// Strictly before the other clock
    Before,
    /// Strictly after the other clock
    After,
    /// Same history
    Equal,
    /// Neither clock descends from the other
    Concurrent,
}

/// Causal version: replica id -> monotonically increasing counter
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, u64>", into = "BTreeMap<String, u64>")]
pub struct VectorClock {
    elements: BTreeMap<String, u64>,
}

impl VectorClock {
    /// Create an empty clock
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clock from `(replica, counter)` pairs. Zero counters are dropped.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        Self {
            elements: entries
                .into_iter()
                .filter(|(_, counter)| *counter > 0)
                .map(|(id, counter)| (id.into(), counter))
                .collect(),
        }
    }

    /// Counter for a replica (zero when absent)
    pub fn get(&self, replica_id: &str) -> u64 {
        self.elements.get(replica_id).copied().unwrap_or(0)
    }

    /// Whether the counter for `replica_id` is exactly `version`
    pub fn version_is(&self, replica_id: &str, version: u64) -> bool {
        self.get(replica_id) == version
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Number of replicas with a non-zero counter
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> + '_ {
        self.elements.iter().map(|(id, counter)| (id.as_str(), *counter))
    }

    /// Record a new event at `replica_id`, returning the new counter
    pub fn increment(&mut self, replica_id: &str) -> u64 {
        let counter = self.elements.entry(replica_id.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Compare two clocks pointwise over the union of their replica ids
    pub fn causality(&self, other: &VectorClock) -> Causality {
        let mut behind = false;
        let mut ahead = false;

        for (id, &counter) in &self.elements {
            match counter.cmp(&other.get(id)) {
                Ordering::Less => behind = true,
                Ordering::Greater => ahead = true,
                Ordering::Equal => {}
            }
        }
        // Ids only present in `other` are ahead of our implicit zero
        if other
            .elements
            .keys()
            .any(|id| !self.elements.contains_key(id))
        {
            behind = true;
        }

        match (behind, ahead) {
            (false, false) => Causality::Equal,
            (true, false) => Causality::Before,
            (false, true) => Causality::After,
            (true, true) => Causality::Concurrent,
        }
    }

    /// True iff `self` is strictly causally before `other`.
    ///
    /// An empty clock is before every non-empty clock and never before itself.
    pub fn less_than(&self, other: &VectorClock) -> bool {
        self.causality(other) == Causality::Before
    }

    /// True iff neither clock descends from the other and they differ
    pub fn concurrent(&self, other: &VectorClock) -> bool {
        self.causality(other) == Causality::Concurrent
    }

    /// Join `self` with every clock in `clocks` (pointwise maximum)
    pub fn combine<'a, I>(&mut self, clocks: I)
    where
        I: IntoIterator<Item = &'a VectorClock>,
    {
        for clock in clocks {
            for (id, &counter) in &clock.elements {
                let slot = self.elements.entry(id.clone()).or_insert(0);
                if *slot < counter {
                    *slot = counter;
                }
            }
        }
    }
}

impl PartialOrd for VectorClock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.causality(other) {
            Causality::Before => Some(Ordering::Less),
            Causality::After => Some(Ordering::Greater),
            Causality::Equal => Some(Ordering::Equal),
            Causality::Concurrent => None,
        }
    }
}

impl From<BTreeMap<String, u64>> for VectorClock {
    fn from(elements: BTreeMap<String, u64>) -> Self {
        Self::from_entries(elements)
    }
}

impl From<VectorClock> for BTreeMap<String, u64> {
    fn from(clock: VectorClock) -> Self {
        clock.elements
    }
}

impl fmt::Display for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, (id, counter)) in self.elements.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "(id {}: ver {})", id, counter)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(entries: &[(&str, u64)]) -> VectorClock {
        VectorClock::from_entries(entries.iter().map(|(id, c)| (*id, *c)))
    }

    #[test]
    fn test_increment_creates_entry() {
        let mut c = VectorClock::new();
        assert_eq!(c.increment("a"), 1);
        assert_eq!(c.increment("a"), 2);
        assert_eq!(c.increment("b"), 1);
        assert!(c.version_is("a", 2));
        assert!(c.version_is("b", 1));
        assert!(c.version_is("c", 0));
    }

    #[test]
    fn test_empty_clock_ordering() {
        let empty = VectorClock::new();
        let one = clock(&[("a", 1)]);

        assert!(empty.less_than(&one));
        assert!(!one.less_than(&empty));
        assert!(!empty.less_than(&empty));
        assert_eq!(empty, VectorClock::new());
    }

    #[test]
    fn test_less_than_requires_every_id() {
        let a = clock(&[("a", 1), ("b", 2)]);
        let b = clock(&[("a", 2), ("b", 2)]);
        let c = clock(&[("b", 3)]);

        assert!(a.less_than(&b));
        assert!(!b.less_than(&a));
        // `a` has an id `c` lacks
        assert!(!a.less_than(&c));
        assert!(a.concurrent(&c));
    }

    #[test]
    fn test_disjoint_ids_are_concurrent() {
        let a = clock(&[("a", 1)]);
        let b = clock(&[("b", 1)]);

        assert!(a.concurrent(&b));
        assert!(b.concurrent(&a));
        assert_eq!(a.partial_cmp(&b), None);
    }

    #[test]
    fn test_zero_counters_are_normalized() {
        let explicit = clock(&[("a", 1), ("b", 0)]);
        let implicit = clock(&[("a", 1)]);
        assert_eq!(explicit, implicit);
        assert_eq!(explicit.len(), 1);
    }

    #[test]
    fn test_combine_takes_pointwise_max() {
        let mut base = clock(&[("a", 3), ("b", 1)]);
        let others = vec![clock(&[("b", 4)]), clock(&[("a", 1), ("c", 2)])];
        base.combine(&others);

        assert_eq!(base, clock(&[("a", 3), ("b", 4), ("c", 2)]));
        for other in &others {
            assert!(other.less_than(&base));
        }
    }

    #[test]
    fn test_combine_with_self_is_identity() {
        let mut c = clock(&[("a", 2), ("b", 5)]);
        let copy = c.clone();
        c.combine([&copy]);
        assert_eq!(c, copy);
    }

    #[test]
    fn test_display() {
        assert_eq!(VectorClock::new().to_string(), "[]");
        assert_eq!(
            clock(&[("0", 1), ("1", 2)]).to_string(),
            "[(id 0: ver 1),(id 1: ver 2)]"
        );
    }

    #[test]
    fn test_serde_drops_zero_counters() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), 0u64);
        map.insert("b".to_string(), 3u64);
        let bytes = postcard::to_allocvec(&map).unwrap();

        let decoded: VectorClock = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, clock(&[("b", 3)]));
    }
}
