use crate::access::model::PrincipalRef;
use crate::error::{Offboard365Error, Result};
use crate::services::DirectoryService;

/// Turn a user-supplied identity into a directory principal.
///
/// Exact lookup by object id / principal name first, then an equality filter
/// on mail and principal name. A failed exact lookup (not just a miss) still
/// falls through to the filter; only a failing filter is reported. When the
/// filter matches several users the first one wins.
pub async fn resolve(directory: &dyn DirectoryService, identity: &str) -> Result<PrincipalRef> {
    let identity = identity.trim();
    if identity.is_empty() {
        return Err(Offboard365Error::NotFound(identity.to_string()));
    }

    match directory.get_user(identity).await {
        Ok(Some(user)) => {
            tracing::debug!("Resolved '{}' by exact lookup", identity);
            return Ok(user.into_principal());
        }
        Ok(None) => {}
        Err(e) => tracing::debug!("Exact lookup of '{}' failed, trying filter: {}", identity, e),
    }

    let mut matches = directory.find_users(identity).await?;
    if matches.len() > 1 {
        tracing::debug!(
            "'{}' matched {} directory users; using the first",
            identity,
            matches.len()
        );
    }

    if matches.is_empty() {
        return Err(Offboard365Error::NotFound(identity.to_string()));
    }
    Ok(matches.swap_remove(0).into_principal())
}
