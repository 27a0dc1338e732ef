pub mod agents;
pub mod events;
pub mod import;
pub mod sessions;
pub mod stats;
