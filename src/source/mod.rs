//! Camera device ownership and frame routing.
//!
//! [`FrameSource`] claims the device, negotiates parameters (falling back to
//! a minimal safe mode when the driver rejects the desired set), tracks the
//! framing rectangle and hands out exactly one frame per request.

mod arming;
mod frame_source;
mod params;

pub use arming::ArmPhase;
pub use frame_source::FrameSource;
pub use params::Configuration;
