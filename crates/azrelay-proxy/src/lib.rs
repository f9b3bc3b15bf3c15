//! Local side of the relay: config payload generation, process
//! supervision, change watching, and health checking.

pub mod error;
pub mod health;
pub mod payload;
pub mod supervisor;
pub mod watcher;

pub use error::{ProxyError, Result};
pub use health::{HealthController, HealthTarget, HttpProbe, ProxyProbe};
pub use supervisor::ProcessSupervisor;
pub use watcher::ChangeWatcher;
