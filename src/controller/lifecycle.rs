pub mod change_sets;
pub mod traffic;
pub mod transitions;

// Re-export everything so callers see one lifecycle API
pub use change_sets::*;
pub use traffic::*;
pub use transitions::*;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Tests can use unwrap/expect for brevity
#[path = "lifecycle_test.rs"]
mod tests;
