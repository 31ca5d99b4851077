//! The three workflow stages, in execution order:
//! fetch → upload to `source/` → move into `raw/<y>/<m>/<d>/`

pub mod archive;
pub mod fetch;
pub mod upload;

pub use archive::{ArchiveStage, MoveSummary};
pub use fetch::{FetchStage, FetchSummary};
pub use upload::UploadStage;
