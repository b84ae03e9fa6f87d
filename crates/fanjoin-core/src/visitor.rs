//! Per-section visitors and the factory that makes one per task.

/// Stateful per-section worker. Each task owns exactly one visitor, so an
/// implementation may accumulate into plain fields without locking.
pub trait Visitor<T>: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Process one element of the section.
    fn visit(&mut self, item: &T) -> Result<(), Self::Error>;
}

/// Produces a fresh, independent visitor per call.
pub trait VisitorFactory<V>: Sync {
    fn create(&self) -> V;
}

impl<V, F> VisitorFactory<V> for F
where
    F: Fn() -> V + Sync,
{
    fn create(&self) -> V {
        self()
    }
}
