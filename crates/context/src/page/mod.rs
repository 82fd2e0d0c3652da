//! Page navigation support
//!
//! Resolves "what does page 79 say?" style queries against extracted
//! document text that carries page markers.

mod locator;
mod mapping;
mod pattern;

pub use locator::{LocateStrategy, LocatedPage, PageLocator};
pub use mapping::PageMapping;
pub use pattern::{detect_page_number, PagePatternMatcher};
