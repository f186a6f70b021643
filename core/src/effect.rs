//! Side-effect descriptions returned by reducers.
//!
//! Effects are values, not execution: a reducer describes what should
//! happen and the owning store executes it. This keeps the decision logic
//! pure and unit-testable without any I/O in place.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// A side effect produced by a reducer.
///
/// The `Action` parameter closes the feedback loop: an executed effect may
/// yield a follow-up action that is fed back into the same reducer.
pub enum Effect<Action> {
    /// No-op effect
    None,

    /// Dispatch `action` after `duration` has elapsed (grace windows,
    /// timeouts)
    Delay {
        /// How long to wait
        duration: Duration,
        /// Action to dispatch after the delay
        action: Box<Action>,
    },

    /// Arbitrary async computation; if it yields an action, that action is
    /// fed back into the reducer
    Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
}

// Manual Debug implementation since Future doesn't implement Debug
impl<Action> std::fmt::Debug for Effect<Action>
where
    Action: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "Effect::None"),
            Self::Delay { duration, action } => f
                .debug_struct("Effect::Delay")
                .field("duration", duration)
                .field("action", action)
                .finish(),
            Self::Future(_) => write!(f, "Effect::Future(<future>)"),
        }
    }
}
