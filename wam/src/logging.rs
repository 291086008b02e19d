//! Logging which compiles away to nothing unless the `logging` feature is enabled.

#[macro_export]
macro_rules! log_at_level {
    ($level:ident, $($arg:expr),*) => {{
        $(let _ = &$arg;)*

        #[cfg(feature = "logging")]
        $crate::log::$level!($($arg),*);
    }};
}

#[macro_export]
macro_rules! log_error {
    ($($arg:expr),*) => {
        $crate::log_at_level!(error, $($arg),*)
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:expr),*) => {
        $crate::log_at_level!(debug, $($arg),*)
    };
}

#[macro_export]
macro_rules! log_trace {
    ($($arg:expr),*) => {
        $crate::log_at_level!(trace, $($arg),*)
    };
}
