//! Abstract operations.

use std::marker::PhantomData;

/// Operation to insert a value.
#[derive(Clone, Copy, Debug)]
pub struct Insert<T>(pub T);

/// Operation to delete a value.
#[derive(Clone, Copy, Debug)]
pub struct Delete<T>(pub T);

/// Operation to select a value.
#[derive(Clone, Copy, Debug)]
pub struct Select<T>(pub T);

/// Operation to atomically modify a value in place.
#[derive(Clone, Copy, Debug)]
pub struct Modify<T>(pub T);

/// Operation to start a value.
#[derive(Clone, Copy, Debug)]
pub struct Start<T>(pub T);

/// Operation to perform a value.
#[derive(Clone, Copy, Debug)]
pub struct Perform<T>(pub T);

/// Selector of everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct All;

/// Selector of `W` by `B`.
#[derive(Clone, Copy, Debug)]
pub struct By<W, B> {
    /// Type of the value to select.
    _what: PhantomData<W>,

    /// Value to select by.
    by: B,
}

impl<W, B> By<W, B> {
    /// Creates a new [`By`] with the given value.
    #[must_use]
    pub fn new(by: B) -> Self {
        Self {
            _what: PhantomData,
            by,
        }
    }

    /// Consumes this [`By`] and returns the inner value.
    #[must_use]
    pub fn into_inner(self) -> B {
        self.by
    }
}

/// Selector of a value by `B` to be processed with `F`.
#[derive(Clone, Copy, Debug)]
pub struct With<B, F> {
    /// Value to select by.
    pub by: B,

    /// Function to process the selected value with.
    pub f: F,
}

impl<B, F> With<B, F> {
    /// Creates a new [`With`] selecting by `by` and processing with `f`.
    #[must_use]
    pub fn new(by: B, f: F) -> Self {
        Self { by, f }
    }
}
