//! Supporting type used in error structures

use std::fmt;
use thiserror::Error;

/// Error indicating an expected value was not found.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Error)]
pub struct Mismatch<T> {
    pub expected: T,
    pub found: T,
}

impl<T> Mismatch<T> {
    pub fn new(expected: T, found: T) -> Self {
        Self { expected, found }
    }
}

impl<T: fmt::Debug> fmt::Display for Mismatch<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "expected {:?}, found {:?}", self.expected, self.found)
    }
}
