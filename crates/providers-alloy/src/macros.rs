//! Macros for use across the alloy providers.

/// Increments a counter metric with label values when the `metrics` feature
/// is enabled.
#[macro_export]
macro_rules! inc_counter {
    ($metric:ident, $($label:expr),+) => {
        #[cfg(feature = "metrics")]
        $crate::metrics::$metric.with_label_values(&[$($label),+]).inc();
    };
}
