//! The explicit simulation context.
//!
//! Everything that would otherwise be process-global mutable state lives
//! here: the step counter, the single seeded random source and the id
//! counter. The context is threaded by `&mut` through every evaluation and
//! every id-issuing call.
//!
//! # Determinism
//!
//! Two contexts built with the same seed produce the same id sequence and
//! the same agent orderings. [`SimContext::reset`] returns a context to
//! exactly that initial state. The random source serializes, so a context
//! rebuilt with [`SimContext::from_parts`] continues the same stream.

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};

use crate::enums::PeriodUnit;

/// Seed used when neither configuration nor the environment supplies one.
pub const DEFAULT_SEED: u64 = 271_828_183;

/// The first step of a fresh simulation.
const FIRST_STEP: u64 = 1;

/// Errors raised by context bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// Step counter would overflow.
    #[error("step counter overflow: cannot advance beyond u64::MAX")]
    StepOverflow,

    /// Id counter exhausted.
    #[error("id allocator exhausted")]
    IdOverflow,
}

// ---------------------------------------------------------------------------
// Id allocation
// ---------------------------------------------------------------------------

/// Monotonic id source shared by every id type.
///
/// Ids are unique across types, which keeps log lines unambiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    /// A fresh allocator issuing `1` first.
    pub const fn new() -> Self {
        Self { next: 1 }
    }

    /// Resume an allocator at `next`.
    pub const fn starting_at(next: u64) -> Self {
        Self { next }
    }

    /// The id that will be issued next.
    pub const fn peek(&self) -> u64 {
        self.next
    }

    /// Issue a new id of any id type.
    pub fn issue<T: From<u64>>(&mut self) -> Result<T, ContextError> {
        let id = self.next;
        self.next = id.checked_add(1).ok_or(ContextError::IdOverflow)?;
        Ok(T::from(id))
    }

    /// Make sure `seen` will never be issued again.
    pub fn observe(&mut self, seen: u64) {
        if seen >= self.next {
            self.next = seen.saturating_add(1);
        }
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Step counter, random source and id allocator for one simulation run.
#[derive(Debug, Clone)]
pub struct SimContext {
    step: u64,
    seed: u64,
    rng: ChaCha12Rng,
    ids: IdAllocator,
}

impl SimContext {
    /// Create a context at step 1 seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            step: FIRST_STEP,
            seed,
            rng: ChaCha12Rng::seed_from_u64(seed),
            ids: IdAllocator::new(),
        }
    }

    /// Rebuild a context from persisted parts.
    ///
    /// With the saved random source the run continues exactly where it
    /// stopped. Without one the stream is derived from the seed and the
    /// step, which is deterministic but not the stream that was saved.
    pub fn from_parts(step: u64, seed: u64, ids: IdAllocator, rng: Option<ChaCha12Rng>) -> Self {
        Self {
            step,
            seed,
            rng: rng.unwrap_or_else(|| ChaCha12Rng::seed_from_u64(seed.wrapping_add(step))),
            ids,
        }
    }

    /// Current step.
    pub const fn step(&self) -> u64 {
        self.step
    }

    /// Seed the context was created (or last reseeded) with.
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Id allocator state, for persistence.
    pub const fn ids(&self) -> IdAllocator {
        self.ids
    }

    /// Advance to the next step. Returns the new step number.
    pub fn advance(&mut self) -> Result<u64, ContextError> {
        self.step = self.step.checked_add(1).ok_or(ContextError::StepOverflow)?;
        Ok(self.step)
    }

    /// Issue a fresh id.
    pub fn issue<T: From<u64>>(&mut self) -> Result<T, ContextError> {
        self.ids.issue()
    }

    /// Record an id that was created outside this context (e.g. restored).
    pub fn observe_id(&mut self, seen: u64) {
        self.ids.observe(seen);
    }

    /// Shuffle `items` in place using the context's random source.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.rng);
    }

    /// Direct access to the random source.
    pub const fn rng_mut(&mut self) -> &mut ChaCha12Rng {
        &mut self.rng
    }

    /// Random source state, for persistence.
    pub const fn rng(&self) -> &ChaCha12Rng {
        &self.rng
    }

    /// Replace the seed and restart the random stream. Step and ids are kept.
    pub fn reseed(&mut self, seed: u64) {
        self.seed = seed;
        self.rng = ChaCha12Rng::seed_from_u64(seed);
    }

    /// Return to the initial state for the current seed: step 1, ids from 1
    /// and a fresh random stream.
    pub fn reset(&mut self) {
        *self = Self::new(self.seed);
    }

    /// Whether the current step closes a period of `unit`.
    pub fn end_of(&self, unit: PeriodUnit) -> bool {
        self.step.checked_rem(unit.steps()) == Some(0)
    }

    /// Whether the current step is the last day of a 30-step month.
    pub fn end_of_month(&self) -> bool {
        self.end_of(PeriodUnit::Month)
    }

    /// Whether the current step is the last day of a 360-step year.
    pub fn end_of_year(&self) -> bool {
        self.end_of(PeriodUnit::Year)
    }
}

impl Default for SimContext {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}
