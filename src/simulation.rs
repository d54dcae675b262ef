use crate::lru::{Geometry, GeometryError, Lookup, LruCache};
use crate::trace::{OpKind, Operation};

/// One simulation run: the cache, its counters and the logical clock used as
/// LRU timestamp.
#[derive(Debug)]
pub struct Simulation {
    cache: LruCache,
    summary: Summary,
    clock: u64,
}

impl Simulation {
    pub fn new(geometry: Geometry) -> Result<Self, GeometryError> {
        Ok(Self {
            cache: LruCache::new(geometry)?,
            summary: Summary::default(),
            clock: 0,
        })
    }

    pub fn geometry(&self) -> Geometry {
        self.cache.geometry()
    }

    pub fn summary(&self) -> Summary {
        self.summary
    }

    /// Current value of the logical clock.
    pub fn time(&self) -> u64 {
        self.clock
    }

    /// Empties the cache and clears counters and clock so another trace can
    /// be run with the same geometry.
    pub fn reset(&mut self) {
        self.cache.reset();
        self.summary = Summary::default();
        self.clock = 0;
    }

    /// Simulates a single access to `address` at logical time `time`.
    pub fn access(&mut self, address: u64, time: u64) -> AccessOutcome {
        let (set_index, tag) = self.cache.decompose(address);
        let set = self.cache.lines_of(set_index);

        let outcome = match set.scan(tag) {
            Lookup::Hit(line_idx) => {
                set.touch(line_idx, time);
                AccessOutcome::Hit
            }
            Lookup::Empty(line_idx) => {
                set.install(line_idx, tag, time);
                AccessOutcome::MissCold
            }
            Lookup::Evict(line_idx) => {
                let prev = set.install(line_idx, tag, time);
                tracing::trace!(set_index, line_idx, "{address:#x} evicted tag {prev:x?}");
                AccessOutcome::MissEviction
            }
        };

        self.summary.record(outcome);
        outcome
    }

    /// Simulates one trace operation and advances the clock.
    ///
    /// A modify accesses the same address twice at the same time; the second
    /// access always hits.
    pub fn step(&mut self, operation: &Operation) -> Step {
        let time = self.clock;

        let first = self.access(operation.address, time);
        let second = match operation.kind {
            OpKind::Load | OpKind::Store => None,
            OpKind::Modify => Some(self.access(operation.address, time)),
        };

        self.clock += 1;
        Step { first, second }
    }

    /// Feeds every operation through [`Simulation::step`], handing each result
    /// to `observer` in trace order.
    pub fn run(
        &mut self,
        operations: impl IntoIterator<Item = Operation>,
        mut observer: impl FnMut(&Operation, &Step),
    ) -> Summary {
        for operation in operations {
            let step = self.step(&operation);
            observer(&operation, &step);
        }

        tracing::info!(
            hits = self.summary.hits,
            misses = self.summary.misses,
            evictions = self.summary.evictions,
            "simulation finished after {} operations",
            self.clock
        );

        self.summary
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AccessOutcome {
    Hit,
    /// miss that filled a free line
    MissCold,
    /// miss that replaced the least recently used line
    MissEviction,
}

impl std::fmt::Display for AccessOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessOutcome::Hit => f.write_str("hit"),
            AccessOutcome::MissCold => f.write_str("miss"),
            AccessOutcome::MissEviction => f.write_str("miss eviction"),
        }
    }
}

/// Outcomes of one trace operation, two of them for a modify.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Step {
    pub first: AccessOutcome,
    pub second: Option<AccessOutcome>,
}

impl Step {
    pub fn outcomes(&self) -> impl Iterator<Item = AccessOutcome> {
        std::iter::once(self.first).chain(self.second)
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.second {
            Some(second) => f.write_fmt(format_args!("{} {second}", self.first)),
            None => f.write_fmt(format_args!("{}", self.first)),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl Summary {
    fn record(&mut self, outcome: AccessOutcome) {
        match outcome {
            AccessOutcome::Hit => self.hits += 1,
            AccessOutcome::MissCold => self.misses += 1,
            AccessOutcome::MissEviction => {
                self.misses += 1;
                self.evictions += 1;
            }
        }
    }

    pub fn accesses(&self) -> u64 {
        self.hits + self.misses
    }

    pub fn percent_hit(&self) -> f64 {
        self.percent_of(self.hits)
    }

    pub fn percent_miss(&self) -> f64 {
        self.percent_of(self.misses)
    }

    fn percent_of(&self, count: u64) -> f64 {
        match self.accesses() {
            0 => 0.0,
            accesses => 100.0 * count as f64 / accesses as f64,
        }
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "hits:{} misses:{} evictions:{}",
            self.hits, self.misses, self.evictions
        ))
    }
}
