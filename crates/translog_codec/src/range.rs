//! Serial numbers and serial ranges.

use std::fmt;

/// Position of an entry in the log.
///
/// Serial numbers are strictly increasing within a log. Serial `0` is never
/// assigned to an entry; it marks the position before the first entry.
pub type SerialNum = u64;

/// An inclusive range of serial numbers, `[from, to]`.
///
/// `to` is the last serial present. A range that has not received any
/// entries yet is created with [`SerialNumRange::starting_at`], which puts
/// `to` one below `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SerialNumRange {
    from: SerialNum,
    to: SerialNum,
}

impl SerialNumRange {
    /// Creates a range covering `[from, to]`.
    #[must_use]
    pub const fn new(from: SerialNum, to: SerialNum) -> Self {
        Self { from, to }
    }

    /// Creates a range holding a single serial.
    #[must_use]
    pub const fn single(serial: SerialNum) -> Self {
        Self {
            from: serial,
            to: serial,
        }
    }

    /// Creates the range of a log that starts at `start` and holds nothing yet.
    #[must_use]
    pub const fn starting_at(start: SerialNum) -> Self {
        Self {
            from: start,
            to: start.saturating_sub(1),
        }
    }

    /// First serial in the range.
    #[must_use]
    pub const fn from(&self) -> SerialNum {
        self.from
    }

    /// Last serial in the range.
    #[must_use]
    pub const fn to(&self) -> SerialNum {
        self.to
    }

    /// Moves the lower bound.
    pub fn set_from(&mut self, from: SerialNum) {
        self.from = from;
    }

    /// Moves the upper bound.
    pub fn set_to(&mut self, to: SerialNum) {
        self.to = to;
    }

    /// Returns true if `serial` lies within `[from, to]`.
    #[must_use]
    pub const fn contains(&self, serial: SerialNum) -> bool {
        self.from <= serial && serial <= self.to
    }
}

impl fmt::Display for SerialNumRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.from, self.to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starting_at_is_below_start() {
        let range = SerialNumRange::starting_at(10);
        assert_eq!(range.from(), 10);
        assert_eq!(range.to(), 9);
        assert!(!range.contains(10));
    }

    #[test]
    fn starting_at_zero_saturates() {
        let range = SerialNumRange::starting_at(0);
        assert_eq!(range, SerialNumRange::single(0));
    }

    #[test]
    fn contains_is_inclusive() {
        let range = SerialNumRange::new(3, 7);
        assert!(range.contains(3));
        assert!(range.contains(7));
        assert!(!range.contains(8));
        assert_eq!(format!("{range}"), "[3, 7]");
    }
}
