/// Document models
///
/// # Models
///
/// - `user`: User accounts, XP and streak counters
/// - `task`: Tasks with embedded collaborators and subtasks
///
/// Both are plain serde structs. Persistence goes through
/// [`crate::store::DocumentStore`], which stores them as JSON documents.
pub mod task;
pub mod user;

pub use task::{
    NewTask, Priority, Role, ShareStatus, SharedUser, Subtask, Task, TaskPatch, DEFAULT_CATEGORY,
    TASK_KEY_PREFIX,
};
pub use user::{NewUser, User, UserProfile, USER_KEY_PREFIX};
