/// Middleware modules for the API server
///
/// - `auth`: bearer session authentication for every `/v1` route except
///   signup and login
pub mod auth;
