mod driver;
mod machine;
mod notice;
mod types;

pub use driver::{AcquisitionWorkflow, Command};
pub use machine::{step, Machine, Policy};
pub use notice::{Notice, Severity};
pub use types::{Effect, Input, Phase, Ticket, Transition, WorkflowState};
