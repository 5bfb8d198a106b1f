//! Page-at-a-time and windowed access over remote cursors
//!
//! [`PageController`] fetches one page per navigation action, sized to the
//! consumer's visible capacity. [`WindowCache`] materializes only the rows a
//! free-scrolling view currently shows, loading them on a background worker.

pub mod page;
mod session;
pub mod window;

#[cfg(test)]
mod test_support;

pub use page::PageController;
pub use window::{CachePhase, Window, WindowCache};
