//! Component-level tests through the public API.

mod unit;
