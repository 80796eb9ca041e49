//! # TaskShare API Server Library
//!
//! The HTTP shell over `taskshare-shared`: request validation, session
//! authentication, error mapping and the real-time event stream.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `middleware`: Session authentication
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
