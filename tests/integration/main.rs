//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises one subsystem through the
//! public API, wired to an in-memory loopback transport.

mod support;

mod dispatcher_tests;
mod registry_tests;
mod virtual_device_tests;
