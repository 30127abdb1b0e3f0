// ABOUTME: Tenancy (C6) — Workspace resolution helpers layered over the persistence module
// ABOUTME: `assert_same_workspace` is the one guard every cross-resource lookup in C8/C10/C11 must pass through

use hub_core::errors::{AppError, AppResult};
use uuid::Uuid;

/// Fail with [`AppError::WorkspaceMismatch`] unless `resource_workspace_id`
/// matches the principal's own workspace. Every vault, activation, and
/// proxy lookup that first resolves a row by id must call this before
/// trusting that row belongs to the caller.
///
/// # Errors
/// Returns [`AppError::WorkspaceMismatch`] on mismatch.
pub fn assert_same_workspace(resource_workspace_id: Uuid, principal_workspace_id: Uuid) -> AppResult<()> {
    if resource_workspace_id == principal_workspace_id {
        Ok(())
    } else {
        Err(AppError::WorkspaceMismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_workspace_passes() {
        let workspace_id = Uuid::new_v4();
        assert!(assert_same_workspace(workspace_id, workspace_id).is_ok());
    }

    #[test]
    fn mismatched_workspace_is_rejected() {
        let err = assert_same_workspace(Uuid::new_v4(), Uuid::new_v4()).expect_err("must mismatch");
        assert!(matches!(err, AppError::WorkspaceMismatch));
    }
}
