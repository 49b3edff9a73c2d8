//! Cross-cutting helpers: atomic file writes and terminal progress.

pub mod fs;
pub mod progress;

pub use fs::atomic_write;
pub use progress::{ProgressBar, format_bytes};
