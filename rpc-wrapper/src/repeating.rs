//! The resend machinery.
//!
//! A wrapped call is carried by a bound pair: a [`RepeatingRequest`] that
//! remembers enough to send itself again, and a [`RepeatingCallback`] that
//! stands in for the application's callback and asks the listener what to do
//! with each outcome. The pair is created together, so neither side ever has
//! to recover the other's type at runtime.
//!
//! Per logical call:
//!
//! ```text
//! created -> data set -> in flight -> deciding -+-> delivered
//!                            ^                  |
//!                            +---- repeat ------+
//! ```
//!
//! The wrapper puts no ceiling on the number of repeats; that belongs to the
//! listener.

mod callback;
mod request;

pub use callback::RepeatingCallback;
pub use request::RepeatingRequest;
