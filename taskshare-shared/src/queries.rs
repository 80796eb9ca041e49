/// Index-backed lookups
///
/// Every query string is built from [`Predicate`] values, and
/// [`Predicate::tag`] is the one place dynamic values are escaped. No call
/// site interpolates an id or email into query text by hand.
///
/// # Example
///
/// ```
/// use taskshare_shared::queries::visible_tasks_query;
///
/// assert_eq!(
///     visible_tasks_query("user:1-a"),
///     r"@ownerId:{user\:1\-a} | @sharedUserId:{user\:1\-a}"
/// );
/// ```
use crate::error::{CoreError, CoreResult};
use crate::index::{
    task_index, user_index, Predicate, TASK_COLLABORATOR_FIELD, TASK_OWNER_FIELD,
    USER_EMAIL_FIELD,
};
use crate::models::{Task, User};
use crate::store::DocumentStore;
use std::collections::HashSet;

/// Tasks owned by `user_id` or shared with them (pending or accepted)
pub fn visible_tasks_query(user_id: &str) -> String {
    Predicate::tag(TASK_OWNER_FIELD, user_id)
        .or(Predicate::tag(TASK_COLLABORATOR_FIELD, user_id))
        .render()
}

/// Exact, case-sensitive email match
pub fn email_query(email: &str) -> String {
    Predicate::tag(USER_EMAIL_FIELD, email).render()
}

/// Union of owned and shared tasks, deduplicated, at most `limit`
///
/// Results come back in index order. Documents that fail to decode are
/// skipped.
pub async fn find_tasks_visible_to(
    store: &dyn DocumentStore,
    user_id: &str,
    limit: usize,
) -> CoreResult<Vec<Task>> {
    // An empty tag is not valid query syntax, and no task has an empty owner
    if user_id.is_empty() {
        return Ok(Vec::new());
    }

    let hits = store
        .query(task_index(), &visible_tasks_query(user_id), limit)
        .await?;

    let mut seen = HashSet::new();
    let mut tasks = Vec::with_capacity(hits.len());
    for hit in hits {
        let task: Task = match serde_json::from_value(hit.document) {
            Ok(task) => task,
            Err(e) => {
                tracing::warn!(key = %hit.key, error = %e, "Skipping undecodable task");
                continue;
            }
        };

        if task.is_visible_to(user_id) && seen.insert(task.id.clone()) {
            tasks.push(task);
        }
    }

    tracing::debug!(user_id = %user_id, count = tasks.len(), "Listed visible tasks");
    Ok(tasks)
}

/// Looks up a user by exact email
///
/// # Errors
///
/// Returns `CoreError::NotFound` when no user has this email.
pub async fn find_user_by_email(store: &dyn DocumentStore, email: &str) -> CoreResult<User> {
    if email.is_empty() {
        return Err(CoreError::not_found("User"));
    }

    let hits = store.query(user_index(), &email_query(email), 1).await?;

    let Some(hit) = hits.into_iter().next() else {
        return Err(CoreError::not_found("User"));
    };

    let user: User = serde_json::from_value(hit.document)
        .map_err(|e| CoreError::StoreUnavailable(format!("corrupt user {}: {}", hit.key, e)))?;

    if user.email != email {
        return Err(CoreError::not_found("User"));
    }
    Ok(user)
}
