//! Integration and unit tests for formgate.
//!
//! Most modules drive the full router with `tower::ServiceExt::oneshot` on
//! top of the in-memory backends and a manual clock (see [`support`]).
//!
//! ## Test Modules
//!
//! - **gate_api_tests**: Admission pipeline, rate limits, CSRF, headers
//! - **auth_api_tests**: Register, login, logout, refresh, verify, schemes
//! - **forms_api_tests**: Forms CRUD, public submissions, dashboard
//! - **store_tests**: SQLite storage backend
//! - **error_tests**: Error envelope and request validation
//! - **config_tests**: Configuration loading and validation
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test
//! cargo test gate_api_tests
//! ```

pub mod support;

pub mod forms_api_tests;
pub mod gate_api_tests;
