/// API route handlers
///
/// This module contains all route handlers organized by resource:
///
/// - `health`: Health check endpoint
/// - `auth`: Signup, login, logout and the caller's profile
/// - `tasks`: Task lifecycle and subtasks
/// - `sharing`: Invites, responses, role changes and revocation
/// - `events`: Server-Sent Events stream of real-time updates
use serde::Serialize;

pub mod auth;
pub mod events;
pub mod health;
pub mod sharing;
pub mod tasks;

/// Body returned by operations with no other result
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}
