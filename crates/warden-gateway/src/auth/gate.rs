//! Owner-or-role authorization.

use std::sync::Arc;
use std::time::Duration;

use warden_core::store::with_deadline;
use warden_core::{Identity, OwnedResource, Role, RoleStore, StoreError};

use super::AuthError;

/// Looks up role reference data.
pub struct RoleResolver {
    store: Arc<dyn RoleStore>,
    timeout: Duration,
}

impl RoleResolver {
    /// Create a resolver over `store`, bounding each lookup by `timeout`.
    #[must_use]
    pub fn new(store: Arc<dyn RoleStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Fetch a role by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for unknown roles, or the store's
    /// error if the lookup fails or times out.
    pub async fn role(&self, name: &str) -> Result<Role, StoreError> {
        with_deadline(self.timeout, self.store.get_by_name(name)).await
    }

    /// Precedence level of the named role.
    ///
    /// # Errors
    ///
    /// See [`RoleResolver::role`].
    pub async fn level_of(&self, name: &str) -> Result<i32, StoreError> {
        self.role(name).await.map(|role| role.level)
    }
}

impl std::fmt::Debug for RoleResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleResolver")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Permits a mutating action if the caller owns the resource or holds a
/// role at least as privileged as the one required.
#[derive(Debug)]
pub struct AuthorizationGate {
    roles: RoleResolver,
}

impl AuthorizationGate {
    /// Create a gate.
    #[must_use]
    pub const fn new(roles: RoleResolver) -> Self {
        Self { roles }
    }

    /// Decide whether `caller` may mutate `resource`.
    ///
    /// Ownership short-circuits without consulting the role store.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Forbidden`] if neither check passes
    /// - [`AuthError::Internal`] if `required_role` does not exist
    /// - [`AuthError::TransientFailure`] if the role lookup fails
    pub async fn authorize<R>(
        &self,
        caller: &Identity,
        resource: &R,
        required_role: &str,
    ) -> Result<(), AuthError>
    where
        R: OwnedResource + Sync + ?Sized,
    {
        if resource.owner_id() == caller.id {
            return Ok(());
        }

        let required = self.roles.role(required_role).await.map_err(|e| match e {
            StoreError::NotFound => {
                AuthError::Internal(format!("required role {required_role:?} does not exist"))
            }
            other => AuthError::TransientFailure(other),
        })?;

        if caller.role.outranks_or_equals(&required) {
            Ok(())
        } else {
            tracing::debug!(
                user_id = %caller.id,
                role = %caller.role.name,
                required_role,
                "insufficient role"
            );
            Err(AuthError::Forbidden)
        }
    }
}
