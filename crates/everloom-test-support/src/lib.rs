//! Everloom Test Support — deterministic clocks and scripted capability
//! ports shared by the engine and store test suites.

mod clock;
mod ports;

pub use clock::{FixedClock, SteppingClock};
pub use ports::{
    FailingCompletion, FailingTimerEffects, RecordingTimerEffects, ScriptedCompletion,
    StaticActorResolver,
};
