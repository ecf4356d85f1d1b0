pub mod api;
pub mod assistant;
pub mod intent;
pub mod tracker;
pub mod whatsapp;

pub use api::{AppState, build_router, create_app};
pub use assistant::{Assistant, AssistantClient, MessageIntent, PatientInfo};
pub use tracker::{NoopTrackerHandler, TrackerClient, TrackerEventHandler, externally_completed};
pub use whatsapp::WhatsAppClient;
