//! Crate-internal logging macros.
//!
//! With the `tracing` feature every event goes to `tracing` under the `event_sync` target. Without
//! it the macros only borrow their field values, so call sites compile unchanged and cost nothing.
//!
//! Call sites use `field = value`, `field = %value` or `field = ?value` pairs followed by a
//! message literal.

#[cfg(feature = "tracing")]
#[allow(unused_macros)]
macro_rules! log_event {
    ($level:ident, $($arg:tt)*) => {
        tracing::$level!(target: "event_sync", $($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
#[allow(unused_macros)]
macro_rules! log_event {
    ($level:ident, $($arg:tt)*) => {
        discard_fields!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
#[allow(unused_macros)]
macro_rules! discard_fields {
    ($field:ident = % $value:expr, $($rest:tt)*) => {{
        let _ = &$value;
        discard_fields!($($rest)*);
    }};
    ($field:ident = ? $value:expr, $($rest:tt)*) => {{
        let _ = &$value;
        discard_fields!($($rest)*);
    }};
    ($field:ident = $value:expr, $($rest:tt)*) => {{
        let _ = &$value;
        discard_fields!($($rest)*);
    }};
    ($message:literal $(, $arg:expr)* $(,)?) => {{
        $( let _ = &$arg; )*
    }};
    () => {};
}

#[allow(unused_macros)]
macro_rules! error {
    ($($arg:tt)*) => { log_event!(error, $($arg)*) };
}

#[allow(unused_macros)]
macro_rules! warn {
    ($($arg:tt)*) => { log_event!(warn, $($arg)*) };
}

#[allow(unused_macros)]
macro_rules! info {
    ($($arg:tt)*) => { log_event!(info, $($arg)*) };
}

#[allow(unused_macros)]
macro_rules! debug {
    ($($arg:tt)*) => { log_event!(debug, $($arg)*) };
}

#[allow(unused_macros)]
macro_rules! trace {
    ($($arg:tt)*) => { log_event!(trace, $($arg)*) };
}
