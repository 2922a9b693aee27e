//! Vehicle state as confirmed by the remote, and the animations it triggers.

pub mod animation;
pub mod reconciler;

pub use animation::{ease_in_out, AnimationController, SweepAnimationState, SweepFrame, SweepPhase};
pub use reconciler::{
    AuthoritativeState, EngineTransition, PendingRequests, Reconciliation, StateField,
    StateReconciler,
};
