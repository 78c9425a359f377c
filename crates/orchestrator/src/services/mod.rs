pub mod network_binder;
pub mod resolver;
pub mod server_service;
pub mod state_reporter;
pub mod task_tracker;
pub mod volume_service;

pub use network_binder::NetworkBinder;
pub use resolver::{ResourceResolver, Scope};
pub use server_service::{PowerAndNetworkSnapshot, ServerService, StateSnapshot};
pub use state_reporter::StateReporter;
pub use task_tracker::{TaskRef, TaskTracker};
pub use volume_service::VolumeService;
