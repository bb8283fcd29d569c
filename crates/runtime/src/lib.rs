//! Run orchestration: the stop signal, the injectable clock, the guarded
//! send sub-pipeline, and the per-profile coordinator loop.

mod clock;
mod coordinator;
mod send_step;
mod stop;

pub use clock::{Clock, TokioClock, interruptible_sleep};
pub use coordinator::{Coordinator, RunEndReason, RunReport};
pub use send_step::{SendOutcome, SendStep, with_one_retry};
pub use stop::StopSignal;
