pub use tracing;

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)+) => ($crate::logging::tracing::error!($($arg)+))
}

#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)+) => ($crate::logging::tracing::trace!($($arg)+))
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)+) => ($crate::logging::tracing::info!($($arg)+))
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)+) => ($crate::logging::tracing::debug!($($arg)+))
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)+) => ($crate::logging::tracing::warn!($($arg)+))
}

/// Target used for dumps of whole modules, so they can be filtered
/// independently of the regular pass logs (e.g. `VASI_LOG=module_dumps=trace`).
pub const MODULE_DUMPS_TARGET: &str = "module_dumps";

#[macro_export]
macro_rules! log_module_dump {
    ($($arg:tt)+) => (
        $crate::logging::tracing::trace!(target: $crate::logging::MODULE_DUMPS_TARGET, $($arg)+)
    )
}
