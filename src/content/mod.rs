pub mod hash;
pub mod lesson;
pub mod store;
pub mod version;

pub use hash::compute_spec_hash;
pub use lesson::{BlockBody, LessonBlock, LessonSpec};
pub use store::ContentStore;
pub use version::{LessonVersion, SourceProvider};
