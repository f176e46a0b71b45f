//! HTTP route handlers for the formgate API.
//!
//! Each sub-module handles one area of the API:
//!
//! - `auth`: registration, login, logout, token refresh and verification
//! - `dashboard`: per-user aggregate counts
//! - `forms`: form management for the signed-in owner
//! - `health`: health check, metrics and the 404 fallback
//! - `submit`: the public submission endpoint
//!
//! Admission (rate limits, bearer tokens, CSRF) happens in the gate
//! middleware before any of these run.

pub mod auth;
pub mod dashboard;
pub mod forms;
pub mod health;
pub mod submit;
