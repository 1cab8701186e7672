pub mod value;
pub mod catalog;
pub mod coercion;
pub mod identity;
pub mod overlay;
pub mod selection;
pub mod editor;
pub mod draft;
pub mod view;
pub mod remote;
pub mod reconcile;
pub mod session;
pub mod tabs;
pub mod export;
pub mod config;
pub mod error;
pub mod cli;

// Test-only printing helper: expands to tprintln! during tests and is absent otherwise.
// Usage in tests: tprintln!("debug: {}", value);
#[cfg(any(test, debug_assertions))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ( eprintln!($($arg)*) );
}

// In non-test builds, provide a no-op tprintln! so calls compile without effect.
#[cfg(not(any(test, debug_assertions)))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ({
        // Preserve formatting checks in release without producing code
        if false { let _ = format!($($arg)*); }
    });
}
