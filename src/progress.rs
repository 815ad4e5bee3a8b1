//! Progress update callbacks

/// Progress reporting hooks for long-running memory operations.
///
/// The library never prints by itself; front-ends implement this to draw a
/// progress bar or stay silent.
pub trait ProgressCallbacks {
    /// A new operation over `total` units (pages or bytes) begins.
    fn init(&mut self, operation: &str, total: usize);
    /// `current` units are done.
    fn update(&mut self, current: usize);
    /// The operation finished.
    fn finish(&mut self);
}

/// No-op progress reporter.
#[derive(Default)]
pub struct NoProgress;

impl ProgressCallbacks for NoProgress {
    fn init(&mut self, _operation: &str, _total: usize) {}
    fn update(&mut self, _current: usize) {}
    fn finish(&mut self) {}
}
