//! Treehouse core: IO-free data model, download layout and URL helpers.
mod layout;
mod model;
mod urls;

pub use layout::{sanitize_component, stage_dir_name, video_filename};
pub use model::{Credentials, RunSummary, StageListing, StageSteps};
pub use urls::{origin_of, resolve_link, stage_listing_url};
