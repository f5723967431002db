//! Session orchestration.
//!
//! * [`event`]   – the event enum every producer sends, plus mode and id types
//! * [`session`] – one interaction's record and the errors that end it
//! * [`runner`]  – [`ModeOrchestrator`], the state machine consuming events

pub mod event;
pub mod runner;
pub mod session;

pub use event::{Mode, OrchestratorEvent, SessionId, TriggerSource};
pub use runner::{Collaborators, ModeOrchestrator, OrchestratorState};
pub use session::{Session, SessionError, SessionStatus};
