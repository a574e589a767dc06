mod history;
mod projection;
mod store;

pub use history::TextureHistory;
pub use projection::{DEFAULT_MIN_POPULATED_FIELDS, StatProjection};
pub use store::SnapshotStore;
