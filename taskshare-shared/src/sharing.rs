/// Collaborator state machine and effective permissions
///
/// Per (task, user) pair:
///
/// ```text
///            invite(role)            accept
///  absent ─────────────────> pending ───────> accepted ──┐
///    ^      (owner only)        │    (invitee)    │  ^   │ changeRole
///    │                          │ decline         │  └───┘ (owner)
///    ├──────────────────────────┘ (invitee)       │
///    └────────────────────────────────────────────┘
///                 revoke (owner, either state)
/// ```
///
/// The checks here are pure: they inspect a loaded task and decide whether
/// a transition is allowed. The task service then applies it with a single
/// atomic store primitive.
use crate::error::{CoreError, CoreResult};
use crate::models::{Role, ShareStatus, SharedUser, Task};
use crate::store::DocPath;

/// What a user may do with a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Full control, including membership
    Owner,

    /// Accepted editor: content fields and subtasks
    Editor,

    /// Accepted viewer: read only
    Viewer,

    /// Invited, not yet accepted: may only respond
    Pending,

    /// Not related to the task
    None,
}

impl Permission {
    pub fn of(task: &Task, user_id: &str) -> Self {
        if task.owner_id == user_id {
            return Permission::Owner;
        }

        match task.collaborator(user_id) {
            Some(SharedUser {
                status: ShareStatus::Pending,
                ..
            }) => Permission::Pending,
            Some(SharedUser {
                role: Role::Editor, ..
            }) => Permission::Editor,
            Some(SharedUser {
                role: Role::Viewer, ..
            }) => Permission::Viewer,
            None => Permission::None,
        }
    }

    pub fn can_read(self) -> bool {
        !matches!(self, Permission::None)
    }

    pub fn can_edit(self) -> bool {
        matches!(self, Permission::Owner | Permission::Editor)
    }
}

/// Path of one collaborator entry
pub fn collaborator_path(user_id: &str) -> DocPath {
    DocPath::root()
        .field("sharedWith")
        .matching("userId", user_id)
}

/// Owner-only operations
pub fn require_owner(task: &Task, actor_id: &str) -> CoreResult<()> {
    if task.owner_id == actor_id {
        Ok(())
    } else {
        Err(CoreError::forbidden("only the task owner may do this"))
    }
}

/// Content mutations: owner or accepted editor
pub fn require_editor(task: &Task, actor_id: &str) -> CoreResult<()> {
    if Permission::of(task, actor_id).can_edit() {
        Ok(())
    } else {
        Err(CoreError::forbidden("requires owner or accepted editor"))
    }
}

/// Reads: owner or anyone in `sharedWith`
pub fn require_reader(task: &Task, actor_id: &str) -> CoreResult<()> {
    if Permission::of(task, actor_id).can_read() {
        Ok(())
    } else {
        Err(CoreError::forbidden("task is not shared with you"))
    }
}

/// absent → pending: the invitee must be neither the owner nor listed
pub fn check_invite(task: &Task, actor_id: &str, invitee_id: &str) -> CoreResult<()> {
    require_owner(task, actor_id)?;

    if invitee_id == task.owner_id {
        return Err(CoreError::conflict("the owner cannot be invited"));
    }
    if task.collaborator(invitee_id).is_some() {
        return Err(CoreError::conflict("user is already a collaborator"));
    }
    Ok(())
}

/// pending → accepted | absent, performed by the invitee
pub fn check_respond<'a>(task: &'a Task, actor_id: &str) -> CoreResult<&'a SharedUser> {
    let entry = task
        .collaborator(actor_id)
        .ok_or_else(|| CoreError::not_found("Invite"))?;

    if entry.status == ShareStatus::Accepted {
        return Err(CoreError::conflict("invite already accepted"));
    }
    Ok(entry)
}

/// accepted → accepted with a new role
pub fn check_change_role<'a>(
    task: &'a Task,
    actor_id: &str,
    target_id: &str,
) -> CoreResult<&'a SharedUser> {
    require_owner(task, actor_id)?;

    let entry = task
        .collaborator(target_id)
        .ok_or_else(|| CoreError::not_found("Collaborator"))?;

    if entry.status == ShareStatus::Pending {
        return Err(CoreError::conflict("invite has not been accepted yet"));
    }
    Ok(entry)
}

/// pending | accepted → absent, performed by the owner
pub fn check_revoke<'a>(
    task: &'a Task,
    actor_id: &str,
    target_id: &str,
) -> CoreResult<&'a SharedUser> {
    require_owner(task, actor_id)?;

    task.collaborator(target_id)
        .ok_or_else(|| CoreError::not_found("Collaborator"))
}
