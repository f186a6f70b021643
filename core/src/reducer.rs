//! The reducer abstraction: pure decision logic over explicit state.
//!
//! A reducer is a function `(State, Action, Environment) → Effects` that
//! mutates its state in place and returns descriptions of the side effects
//! to run. All business rules live in reducers; the stores that own them do
//! the locking and the effect execution.

use crate::effect::Effect;
use smallvec::SmallVec;

/// Core trait for the engine's state machines.
pub trait Reducer {
    /// The state type this reducer operates on
    type State;

    /// The action type this reducer processes
    type Action;

    /// The environment type with injected dependencies
    type Environment;

    /// Reduce an action into state changes and effects.
    ///
    /// This is where validation and transition rules live. The returned
    /// effects are executed by the owning store; the reducer itself performs
    /// no I/O.
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]>;
}
