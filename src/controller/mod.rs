pub mod service;
pub mod types;

pub use service::Controller;
pub use types::ControllerStatus;
