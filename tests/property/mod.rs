//! Property-based tests

mod progress_proptest;
