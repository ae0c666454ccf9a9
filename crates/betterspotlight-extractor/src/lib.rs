//! Content extraction: native text extraction plus expected-gap
//! classification for formats whose backends are external.

pub mod extractor;
pub mod service;

pub use extractor::NativeExtractor;
