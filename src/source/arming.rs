//! One-shot frame registration.
//!
//! Each registration gets a generation number. A hardware delivery carries
//! the generation it was registered with and is forwarded only if that
//! registration is still armed, so re-arming, stopping or closing silently
//! drops deliveries that were already in flight.

use crate::hardware::FrameCallback;

/// Observable phase of the registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmPhase {
    /// Nothing registered.
    Idle,
    /// Waiting for the next frame.
    Armed,
    /// The registration was delivered.
    Fired,
}

enum ArmState {
    Idle,
    Armed(FrameCallback),
    Fired,
}

pub(crate) struct FrameArm {
    generation: u64,
    state: ArmState,
}

impl FrameArm {
    pub(crate) fn new() -> Self {
        Self {
            generation: 0,
            state: ArmState::Idle,
        }
    }

    /// Registers `on_frame`, replacing any previous registration.
    pub(crate) fn arm(&mut self, on_frame: FrameCallback) -> u64 {
        self.generation += 1;
        self.state = ArmState::Armed(on_frame);
        self.generation
    }

    /// Takes the callback if `generation` is still armed.
    pub(crate) fn fire(&mut self, generation: u64) -> Option<FrameCallback> {
        if generation != self.generation {
            return None;
        }
        match std::mem::replace(&mut self.state, ArmState::Fired) {
            ArmState::Armed(on_frame) => Some(on_frame),
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Drops any registration and invalidates in-flight deliveries.
    pub(crate) fn disarm(&mut self) {
        self.generation += 1;
        self.state = ArmState::Idle;
    }

    pub(crate) fn phase(&self) -> ArmPhase {
        match self.state {
            ArmState::Idle => ArmPhase::Idle,
            ArmState::Armed(_) => ArmPhase::Armed,
            ArmState::Fired => ArmPhase::Fired,
        }
    }
}
