mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from valo for tests
pub use valo::{
    Adjustment, CropRatio, CropRegion, EditParams, EditSession, Preset, RemoveStatus, SessionDb,
    SessionRepository, Tab,
};
