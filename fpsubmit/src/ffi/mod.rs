//! FFI bindings for external libraries
//!
//! Only compiled with the `chromaprint` feature; requires libchromaprint at
//! link time.

pub mod chromaprint;
