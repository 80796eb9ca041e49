/// Identity primitives
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing
/// - [`session`]: opaque bearer tokens mapped to user ids
///
/// The task core trusts the user id a session resolves to and performs no
/// credential logic of its own.
///
/// # Example
///
/// ```
/// use taskshare_shared::auth::password::{hash_password, verify_password};
/// use taskshare_shared::auth::session::{generate_session_token, hash_session_token};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("user_password")?;
/// assert!(verify_password("user_password", &hash)?);
///
/// let token = generate_session_token();
/// assert_ne!(hash_session_token(&token), token);
/// # Ok(())
/// # }
/// ```
pub mod password;
pub mod session;

pub use password::{hash_password, verify_password, PasswordError};
pub use session::SessionStore;
