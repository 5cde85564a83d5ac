//! Engine tests that drive the protocol stack end to end against the
//! simulated console.

mod engine_tests;
