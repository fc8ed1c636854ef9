//! Chunk Pipeline: walks the root, processes files on a worker pool, and
//! assembles results into `{entries}`/`{summary}` payloads.

mod scheduler;

pub use scheduler::{PipelineHandles, spawn_pipeline};
