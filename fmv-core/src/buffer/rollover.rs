//! Rollover conditions deciding when a temp file is handed off.

use std::fmt;
use std::time::Duration;

use crate::error::BufferError;

/// Bytes per megabyte for [`RolloverCondition::megabyte_count`].
pub const BYTES_PER_MEGABYTE: u64 = 1_000_000;

/// Buffer observables a condition is evaluated against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RolloverState {
    /// Bytes written to the current temp file.
    pub byte_count: u64,
    /// Time since the current temp file was created.
    pub age: Duration,
}

/// Stateless predicate over [`RolloverState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolloverCondition {
    /// Ready once at least this many bytes were written.
    ByteCount(u64),
    /// Ready once the file is at least this old.
    ElapsedTime(Duration),
    /// Ready when either side is ready.
    Or(Box<RolloverCondition>, Box<RolloverCondition>),
}

impl RolloverCondition {
    /// Byte-count condition expressed in megabytes (10^6 bytes).
    pub fn megabyte_count(megabytes: u64) -> Result<Self, BufferError> {
        if megabytes == 0 || megabytes > u64::MAX / BYTES_PER_MEGABYTE {
            return Err(BufferError::InvalidThreshold(format!(
                "megabyte count must be in 1..={}, got {}",
                u64::MAX / BYTES_PER_MEGABYTE,
                megabytes
            )));
        }
        Ok(RolloverCondition::ByteCount(megabytes * BYTES_PER_MEGABYTE))
    }

    /// Combine two conditions with OR.
    pub fn or(self, other: RolloverCondition) -> Self {
        RolloverCondition::Or(Box::new(self), Box::new(other))
    }

    /// Evaluate the condition. Thresholds are inclusive.
    pub fn is_ready(&self, state: &RolloverState) -> bool {
        match self {
            RolloverCondition::ByteCount(threshold) => state.byte_count >= *threshold,
            RolloverCondition::ElapsedTime(threshold) => state.age >= *threshold,
            RolloverCondition::Or(a, b) => a.is_ready(state) || b.is_ready(state),
        }
    }

    /// Walk the condition tree. For `Or` the left child is visited first,
    /// then the node itself, then the right child.
    pub fn accept<V: RolloverVisitor + ?Sized>(&self, visitor: &mut V) {
        match self {
            RolloverCondition::ByteCount(threshold) => visitor.visit_byte_count(*threshold),
            RolloverCondition::ElapsedTime(threshold) => visitor.visit_elapsed_time(*threshold),
            RolloverCondition::Or(a, b) => {
                a.accept(visitor);
                visitor.visit_or();
                b.accept(visitor);
            }
        }
    }
}

/// Introspection over a [`RolloverCondition`] tree.
pub trait RolloverVisitor {
    fn visit_byte_count(&mut self, _threshold: u64) {}

    fn visit_elapsed_time(&mut self, _threshold: Duration) {}

    fn visit_or(&mut self) {}
}

/// Renders a condition as an infix expression for logging.
#[derive(Debug, Default)]
struct Describe(Vec<String>);

impl RolloverVisitor for Describe {
    fn visit_byte_count(&mut self, threshold: u64) {
        self.0.push(format!("bytes >= {}", threshold));
    }

    fn visit_elapsed_time(&mut self, threshold: Duration) {
        self.0.push(format!("age >= {}ms", threshold.as_millis()));
    }

    fn visit_or(&mut self) {
        self.0.push("OR".to_string());
    }
}

impl fmt::Display for RolloverCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut describe = Describe::default();
        self.accept(&mut describe);
        write!(f, "{}", describe.0.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(n: u64) -> RolloverState {
        RolloverState {
            byte_count: n,
            age: Duration::ZERO,
        }
    }

    fn aged(ms: u64) -> RolloverState {
        RolloverState {
            byte_count: 0,
            age: Duration::from_millis(ms),
        }
    }

    #[test]
    fn test_byte_count_boundary() {
        let condition = RolloverCondition::ByteCount(100);
        assert!(!condition.is_ready(&bytes(0)));
        assert!(!condition.is_ready(&bytes(99)));
        assert!(condition.is_ready(&bytes(100)));
        assert!(condition.is_ready(&bytes(101)));
    }

    #[test]
    fn test_elapsed_time_boundary() {
        let condition = RolloverCondition::ElapsedTime(Duration::from_millis(500));
        assert!(!condition.is_ready(&aged(499)));
        assert!(condition.is_ready(&aged(500)));
        assert!(condition.is_ready(&aged(501)));
    }

    #[test]
    fn test_megabyte_count() {
        assert_eq!(
            RolloverCondition::megabyte_count(3).unwrap(),
            RolloverCondition::ByteCount(3_000_000)
        );
        assert!(RolloverCondition::megabyte_count(0).is_err());
        assert!(RolloverCondition::megabyte_count(u64::MAX / BYTES_PER_MEGABYTE).is_ok());
        assert!(RolloverCondition::megabyte_count(u64::MAX / BYTES_PER_MEGABYTE + 1).is_err());
    }

    #[test]
    fn test_or_truth_table() {
        let always = || RolloverCondition::ByteCount(0);
        let never = || RolloverCondition::ByteCount(u64::MAX);
        let state = bytes(10);

        assert!(!never().or(never()).is_ready(&state));
        assert!(always().or(never()).is_ready(&state));
        assert!(never().or(always()).is_ready(&state));
        assert!(always().or(always()).is_ready(&state));
    }

    #[test]
    fn test_or_is_associative() {
        let a = || RolloverCondition::ByteCount(50);
        let b = || RolloverCondition::ElapsedTime(Duration::from_secs(1));
        let c = || RolloverCondition::ByteCount(10);

        let left = a().or(b()).or(c());
        let right = a().or(b().or(c()));
        for state in [bytes(5), bytes(20), bytes(60), aged(2000)] {
            assert_eq!(left.is_ready(&state), right.is_ready(&state));
        }
    }

    #[derive(Default)]
    struct Recorder(Vec<String>);

    impl RolloverVisitor for Recorder {
        fn visit_byte_count(&mut self, threshold: u64) {
            self.0.push(format!("bytes:{}", threshold));
        }

        fn visit_elapsed_time(&mut self, threshold: Duration) {
            self.0.push(format!("time:{}", threshold.as_secs()));
        }

        fn visit_or(&mut self) {
            self.0.push("or".to_string());
        }
    }

    #[test]
    fn test_visitor_order() {
        let condition = RolloverCondition::ByteCount(1)
            .or(RolloverCondition::ElapsedTime(Duration::from_secs(2)).or(RolloverCondition::ByteCount(3)));

        let mut recorder = Recorder::default();
        condition.accept(&mut recorder);
        assert_eq!(recorder.0, vec!["bytes:1", "or", "time:2", "or", "bytes:3"]);
    }

    #[test]
    fn test_display() {
        let condition = RolloverCondition::megabyte_count(2)
            .unwrap()
            .or(RolloverCondition::ElapsedTime(Duration::from_secs(60)));
        assert_eq!(condition.to_string(), "bytes >= 2000000 OR age >= 60000ms");
    }
}
