//! Two-slot comparator: reference and candidate point sets, scored as soon
//! as both are present.
//!
//! [`ComparatorState`] is the plain state machine. [`FaceComparator`] wraps
//! it in a mutex so that writing a slot and checking whether both are filled
//! happen in one critical section, and adds a generation counter so a
//! comparator can be reused across runs.

use crate::scorer::{ScoreError, SimilarityScorer};
use crate::types::{AbsolutePoint, ComparisonResult, Slot};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComparatorError {
    #[error(transparent)]
    Score(#[from] ScoreError),
    #[error("stale write for generation {requested}, comparator is at generation {current}")]
    StaleGeneration { current: u64, requested: u64 },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) enum SlotState {
    #[default]
    Empty,
    Filled(Vec<AbsolutePoint>),
}

impl SlotState {
    pub fn is_filled(&self) -> bool {
        matches!(self, SlotState::Filled(_))
    }
}

/// What a slot write led to.
#[derive(Debug, PartialEq)]
pub enum Transition<'a> {
    /// At least one slot is still empty.
    Waiting,
    /// Both slots are filled; these are the sets to score.
    Ready {
        reference: &'a [AbsolutePoint],
        candidate: &'a [AbsolutePoint],
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComparatorState {
    reference: SlotState,
    candidate: SlotState,
}

impl ComparatorState {
    /// Overwrite `slot` with `points` and report whether both slots are now
    /// filled. Repeated writes replace, they never accumulate.
    pub fn apply(&mut self, slot: Slot, points: Vec<AbsolutePoint>) -> Transition<'_> {
        *self.slot_mut(slot) = SlotState::Filled(points);
        match (&self.reference, &self.candidate) {
            (SlotState::Filled(reference), SlotState::Filled(candidate)) => {
                Transition::Ready { reference, candidate }
            }
            _ => Transition::Waiting,
        }
    }

    pub fn is_filled(&self, slot: Slot) -> bool {
        self.slot(slot).is_filled()
    }

    pub(crate) fn slot(&self, slot: Slot) -> &SlotState {
        match slot {
            Slot::Reference => &self.reference,
            Slot::Candidate => &self.candidate,
        }
    }

    fn slot_mut(&mut self, slot: Slot) -> &mut SlotState {
        match slot {
            Slot::Reference => &mut self.reference,
            Slot::Candidate => &mut self.candidate,
        }
    }
}

/// Result of [`FaceComparator::set_slot`].
#[derive(Debug, Clone, PartialEq)]
pub enum SlotOutcome {
    Waiting,
    Scored(ComparisonResult),
}

struct Inner {
    state: ComparatorState,
    generation: u64,
}

/// Thread-safe comparator shared between the two extraction tasks.
pub struct FaceComparator {
    scorer: SimilarityScorer,
    inner: Mutex<Inner>,
}

impl FaceComparator {
    pub fn new(scorer: SimilarityScorer) -> Self {
        Self {
            scorer,
            inner: Mutex::new(Inner {
                state: ComparatorState::default(),
                generation: 0,
            }),
        }
    }

    pub fn scorer(&self) -> &SimilarityScorer {
        &self.scorer
    }

    /// Fill `slot` in the current generation.
    ///
    /// When this write leaves both slots filled, the pair is scored and the
    /// result returned; otherwise [`SlotOutcome::Waiting`].
    pub fn set_slot(
        &self,
        slot: Slot,
        points: Vec<AbsolutePoint>,
    ) -> Result<SlotOutcome, ComparatorError> {
        let mut inner = self.lock();
        self.fill(&mut inner, slot, points)
    }

    /// Like [`set_slot`](Self::set_slot), but rejects the write if the
    /// comparator has been reset since `generation` was observed.
    pub fn set_slot_in(
        &self,
        generation: u64,
        slot: Slot,
        points: Vec<AbsolutePoint>,
    ) -> Result<SlotOutcome, ComparatorError> {
        let mut inner = self.lock();
        if inner.generation != generation {
            tracing::warn!(
                %slot,
                current = inner.generation,
                requested = generation,
                "dropping stale slot write"
            );
            return Err(ComparatorError::StaleGeneration {
                current: inner.generation,
                requested: generation,
            });
        }
        self.fill(&mut inner, slot, points)
    }

    /// Empty both slots and start a new generation, returned.
    pub fn reset(&self) -> u64 {
        let mut inner = self.lock();
        inner.state = ComparatorState::default();
        inner.generation += 1;
        tracing::debug!(generation = inner.generation, "comparator reset");
        inner.generation
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn is_filled(&self, slot: Slot) -> bool {
        self.lock().state.is_filled(slot)
    }

    fn fill(
        &self,
        inner: &mut Inner,
        slot: Slot,
        points: Vec<AbsolutePoint>,
    ) -> Result<SlotOutcome, ComparatorError> {
        tracing::debug!(%slot, points = points.len(), generation = inner.generation, "slot filled");
        match inner.state.apply(slot, points) {
            Transition::Waiting => Ok(SlotOutcome::Waiting),
            Transition::Ready { reference, candidate } => {
                let result = self.scorer.score(reference, candidate)?;
                Ok(SlotOutcome::Scored(result))
            }
        }
    }

    // Scoring never panics while the lock is held, but recover the state
    // rather than propagate poisoning if a caller's thread did.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for FaceComparator {
    fn default() -> Self {
        Self::new(SimilarityScorer::default())
    }
}
