use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{Error, ErrorKind};
use crate::value::{Value, ValueRepr};

/// Bounds for the cost of a single render.
///
/// All limits are off by default.
///
/// * `render_score_limit` counts rendered nodes.
/// * `render_length_limit` bounds the number of bytes written.
/// * `assign_score_limit` bounds the size of the values created by
///   `assign` and `capture`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Maximum number of rendered nodes.
    pub render_score_limit: Option<usize>,
    /// Maximum number of bytes rendered.
    pub render_length_limit: Option<usize>,
    /// Maximum accumulated size of assigned values.
    pub assign_score_limit: Option<usize>,
}

impl ResourceLimits {
    /// Sets the render score limit.
    pub fn with_render_score_limit(mut self, limit: usize) -> Self {
        self.render_score_limit = Some(limit);
        self
    }

    /// Sets the render length limit.
    pub fn with_render_length_limit(mut self, limit: usize) -> Self {
        self.render_length_limit = Some(limit);
        self
    }

    /// Sets the assign score limit.
    pub fn with_assign_score_limit(mut self, limit: usize) -> Self {
        self.assign_score_limit = Some(limit);
        self
    }
}

/// Tracks resource usage of a render against its [`ResourceLimits`].
///
/// The tracker is always wrapped in an `Arc` so that it can be shared with
/// the isolated contexts of partials.
#[derive(Debug)]
pub struct LimitTracker {
    limits: ResourceLimits,
    render_score: AtomicUsize,
    assign_score: AtomicUsize,
    reached: AtomicBool,
}

impl LimitTracker {
    /// Creates a new tracker.
    pub fn new(limits: ResourceLimits) -> Arc<LimitTracker> {
        Arc::new(LimitTracker {
            limits,
            render_score: AtomicUsize::new(0),
            assign_score: AtomicUsize::new(0),
            reached: AtomicBool::new(false),
        })
    }

    /// Returns the configured limits.
    pub fn limits(&self) -> ResourceLimits {
        self.limits
    }

    /// Has any limit been exceeded?
    pub fn reached(&self) -> bool {
        self.reached.load(Ordering::Relaxed)
    }

    /// The number of nodes rendered so far.
    pub fn render_score(&self) -> usize {
        self.render_score.load(Ordering::Relaxed)
    }

    /// The accumulated assign score.
    pub fn assign_score(&self) -> usize {
        self.assign_score.load(Ordering::Relaxed)
    }

    fn exceeded(&self) -> Error {
        debug!("resource limits reached");
        self.reached.store(true, Ordering::Relaxed);
        Error::from(ErrorKind::MemoryLimit)
    }

    /// Accounts for rendered nodes.
    pub fn increment_render_score(&self, amount: usize) -> Result<(), Error> {
        let score = self.render_score.fetch_add(amount, Ordering::Relaxed) + amount;
        match self.limits.render_score_limit {
            Some(limit) if score > limit => Err(self.exceeded()),
            _ => Ok(()),
        }
    }

    /// Accounts for assigned values.
    pub fn increment_assign_score(&self, amount: usize) -> Result<(), Error> {
        let score = self.assign_score.fetch_add(amount, Ordering::Relaxed) + amount;
        match self.limits.assign_score_limit {
            Some(limit) if score > limit => Err(self.exceeded()),
            _ => Ok(()),
        }
    }

    /// Checks the number of bytes written so far.
    pub fn check_render_length(&self, written: usize) -> Result<(), Error> {
        match self.limits.render_length_limit {
            Some(limit) if written > limit => Err(self.exceeded()),
            _ => Ok(()),
        }
    }
}

/// Computes what assigning a value costs.
///
/// Scalars cost one.  Strings cost one plus their byte length, arrays and
/// hashes one plus the cost of their items (keys count as items).
pub fn assign_score_of(value: &Value) -> usize {
    match value.0 {
        ValueRepr::String(ref s) => 1 + s.len(),
        ValueRepr::Seq(ref items) => 1 + items.iter().map(assign_score_of).sum::<usize>(),
        ValueRepr::Map(ref map, _) => {
            1 + map
                .iter()
                .map(|(key, item)| 1 + key.len() + assign_score_of(item))
                .sum::<usize>()
        }
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_assign_score() {
        assert_eq!(assign_score_of(&Value::from("hello")), 6);
        assert_eq!(assign_score_of(&Value::from(42)), 1);
        assert_eq!(assign_score_of(&Value::from(vec!["ab", "c"])), 6);
        assert_eq!(assign_score_of(&Value::from(Vec::<Value>::new())), 1);
        let map: Value = vec![("a", 1)].into_iter().collect();
        assert_eq!(assign_score_of(&map), 4);
    }

    #[test]
    fn test_tracker() {
        let tracker = LimitTracker::new(ResourceLimits::default().with_render_score_limit(2));
        assert!(tracker.increment_render_score(2).is_ok());
        assert!(!tracker.reached());
        let err = tracker.increment_render_score(1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MemoryLimit);
        assert_eq!(err.to_string(), "Liquid error: Memory limits exceeded");
        assert!(tracker.reached());
        assert!(tracker.increment_assign_score(1000).is_ok());
    }
}
