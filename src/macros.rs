//! Internal logging macros.
//!
//! Operational events go through the `log` crate when the `log` feature is
//! on. Without it the arguments are still type-checked but never formatted.

macro_rules! ph_debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "log")]
        {
            log::debug!($($arg)*);
        }
        #[cfg(not(feature = "log"))]
        {
            if false {
                let _ = format!($($arg)*);
            }
        }
    }};
}

macro_rules! ph_trace {
    ($($arg:tt)*) => {{
        #[cfg(feature = "log")]
        {
            log::trace!($($arg)*);
        }
        #[cfg(not(feature = "log"))]
        {
            if false {
                let _ = format!($($arg)*);
            }
        }
    }};
}
