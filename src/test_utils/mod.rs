//! Test utilities: a scripted mock backend and row helpers.

pub mod mock;
pub mod test_helpers;

pub use mock::{Entry, MockBehavior, MockDriver, MockEvent};
pub use test_helpers::read_backends;
