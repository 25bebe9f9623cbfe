//! Application layer - Services generic over the ports.

pub mod dispatcher;
pub mod poller;
pub mod publish;
pub mod runner;

pub use dispatcher::{AckPolicy, DispatchSettings, Dispatcher, Disposition, JobProcessor, JobReport};
pub use poller::{PollSummary, QueuePoller};
pub use runner::TranscodeRunner;
