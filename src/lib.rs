pub mod editing;
pub mod history;
pub mod models;
pub mod overlay;
pub mod pipeline;
pub mod session;
pub mod store;

pub use editing::{build_edit_pipeline, export_image, process_image, process_image_debug};
pub use history::{History, HistoryState};
pub use models::{Adjustment, CropRatio, CropRegion, EditParams, Preset};
pub use overlay::{BoxMode, CropOverlay};
pub use pipeline::{
    Pipeline, PipelineData, PipelineStep, PipelineContext,
    MetadataValue, DebugConfig
};
pub use session::{EditSession, RemoveStatus, Tab};
pub use store::{SessionDb, SessionRepository};
