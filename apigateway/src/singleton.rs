//! Reducing iterators that are expected to hold exactly one element.

use thiserror::Error;

/// The iterator did not hold the expected number of elements.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SingletonError {
    #[error("Expected a single value, but {0} were found")]
    NotSingleton(usize),
    #[error("Expected zero or a single value, but {0} were found")]
    TooMany(usize),
}

/// Singleton reductions for any iterator.
pub trait SingletonExt: Iterator + Sized {
    /// The only element, or an error if there are zero or several.
    fn try_singleton(mut self) -> Result<Self::Item, SingletonError> {
        let first = self.next().ok_or(SingletonError::NotSingleton(0))?;
        match self.count() {
            0 => Ok(first),
            rest => Err(SingletonError::NotSingleton(rest + 1)),
        }
    }

    /// The only element, `alternative` if there is none, an error if there are several.
    fn singleton_or(mut self, alternative: Self::Item) -> Result<Self::Item, SingletonError> {
        match self.next() {
            None => Ok(alternative),
            Some(first) => match self.count() {
                0 => Ok(first),
                rest => Err(SingletonError::TooMany(rest + 1)),
            },
        }
    }

    /// The only element, if there is exactly one.
    fn singleton(self) -> Option<Self::Item> {
        self.try_singleton().ok()
    }
}

impl<I: Iterator> SingletonExt for I {}
