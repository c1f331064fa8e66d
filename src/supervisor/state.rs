//! Per-job audit state machine
//!
//! Transitions are pure: [`JobSlot::advance`] returns the next slot and the
//! effects the supervisor must perform, without touching the store.

use crate::audit::RecordId;
use crate::runner::LifecycleEvent;

/// Audit state of one job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobState {
    #[default]
    Idle,
    /// A tick is running. `runtime_id` is the open audit record, known only
    /// once the start insert has resolved.
    Running {
        tick: u64,
        runtime_id: Option<RecordId>,
    },
}

/// Inputs to the state machine: lifecycle events plus the resolution of
/// the start-of-tick insert.
#[derive(Debug, Clone, Copy)]
pub enum Input<'a> {
    Lifecycle(&'a LifecycleEvent),
    StartRecorded { tick: u64, id: RecordId },
    StartFailed { tick: u64 },
}

/// Side effects requested by a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Insert a pending record for `tick`
    OpenRecord { tick: u64 },
    /// Patch the open record with the tick's outcome
    FinalizeRecord {
        id: RecordId,
        error: Option<String>,
        elapsed_ms: u64,
    },
    /// The tick completed with no open record; nothing to finalize
    SkipFinalize,
    /// A start insert resolved after its tick had already completed
    Orphaned { tick: u64, id: RecordId },
    /// A new tick started while another was still open
    Abandoned {
        tick: u64,
        runtime_id: Option<RecordId>,
    },
}

/// State plus the tick counter used to match insert results to their tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JobSlot {
    pub state: JobState,
    pub ticks: u64,
}

impl JobSlot {
    pub fn runtime_id(&self) -> Option<RecordId> {
        match self.state {
            JobState::Running { runtime_id, .. } => runtime_id,
            JobState::Idle => None,
        }
    }

    pub fn advance(self, input: Input<'_>) -> (JobSlot, Vec<Effect>) {
        match input {
            Input::Lifecycle(LifecycleEvent::TickStarted { .. }) => {
                let tick = self.ticks + 1;
                let mut effects = Vec::with_capacity(2);
                if let JobState::Running {
                    tick: open_tick,
                    runtime_id,
                } = self.state
                {
                    effects.push(Effect::Abandoned {
                        tick: open_tick,
                        runtime_id,
                    });
                }
                effects.push(Effect::OpenRecord { tick });

                let next = JobSlot {
                    state: JobState::Running {
                        tick,
                        runtime_id: None,
                    },
                    ticks: tick,
                };
                (next, effects)
            }

            Input::Lifecycle(LifecycleEvent::TickComplete {
                error, elapsed_ms, ..
            }) => {
                let effect = match self.runtime_id() {
                    Some(id) => Effect::FinalizeRecord {
                        id,
                        error: error.clone(),
                        elapsed_ms: *elapsed_ms,
                    },
                    None => Effect::SkipFinalize,
                };
                let next = JobSlot {
                    state: JobState::Idle,
                    ..self
                };
                (next, vec![effect])
            }

            Input::Lifecycle(LifecycleEvent::TimeWarning { .. })
            | Input::Lifecycle(LifecycleEvent::OverlappingCall) => (self, Vec::new()),

            Input::StartRecorded { tick, id } => match self.state {
                JobState::Running { tick: open_tick, .. } if open_tick == tick => {
                    let next = JobSlot {
                        state: JobState::Running {
                            tick,
                            runtime_id: Some(id),
                        },
                        ..self
                    };
                    (next, Vec::new())
                }
                _ => (self, vec![Effect::Orphaned { tick, id }]),
            },

            Input::StartFailed { tick } => match self.state {
                JobState::Running { tick: open_tick, .. } if open_tick == tick => {
                    let next = JobSlot {
                        state: JobState::Running {
                            tick,
                            runtime_id: None,
                        },
                        ..self
                    };
                    (next, Vec::new())
                }
                _ => (self, Vec::new()),
            },
        }
    }
}
