//! HTTP handlers for resources and authentication.

pub mod auth;
pub mod resource;
