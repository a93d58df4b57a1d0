//! Metrics for the alloy providers.

use lazy_static::lazy_static;
use prometheus::{self, register_counter_vec, CounterVec};

lazy_static! {
    /// Tracks the number of provider method calls.
    pub static ref PROVIDER_CALLS: CounterVec = register_counter_vec!(
        "silt_provider_calls",
        "Number of provider method calls",
        &["method"]
    ).expect("Provider Calls failed to register");

    /// Tracks the number of errors in provider methods.
    pub static ref PROVIDER_ERRORS: CounterVec = register_counter_vec!(
        "silt_provider_errors",
        "Number of provider errors",
        &["method", "error"]
    ).expect("Provider Errors failed to register");
}
