//! Viewer-side services: settings sync, prompt submission, controls and the
//! session that ties them to the lifecycle

pub mod controls;
pub mod generate;
pub mod session;
pub mod sync;

pub use controls::ControlPanel;
pub use generate::{GenerationClient, GenerationStatus};
pub use session::{fetch_panorama_list, ViewerSession};
pub use sync::{push_detached, ConfigSyncAdapter, HttpConfigSync, UpdateConfigRequest};
