mod request_context_extractor;

pub use request_context_extractor::*;
