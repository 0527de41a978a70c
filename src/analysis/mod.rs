pub mod extractor;
pub mod pipeline;

pub use extractor::{extract_code_blocks, extract_error_messages};
pub use pipeline::ExtractionPipeline;
