//! Macros for use across the driver.

/// Increments a counter metric when the `metrics` feature is enabled.
#[macro_export]
macro_rules! inc_indexed {
    ($metric:ident) => {
        #[cfg(feature = "metrics")]
        $crate::metrics::$metric.inc();
    };
}
