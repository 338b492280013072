pub mod decision;
pub mod dispatch;
pub mod service;

pub use service::{ControlEngine, ControlService};
