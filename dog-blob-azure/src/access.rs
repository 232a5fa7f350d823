use tracing::{debug, warn};

use crate::{BlobBackend, ContainerAcl};

/// Visibility of a container, derived from its ACL on every URL request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerAccess {
    /// Anonymous reads allowed; URLs need no signature
    Public,
    /// Reads require a shared access signature
    Private,
}

impl ContainerAccess {
    /// Classify an ACL record; no record means private
    pub fn from_acl(acl: Option<&ContainerAcl>) -> Self {
        match acl.and_then(|acl| acl.public_access_level) {
            Some(_) => Self::Public,
            None => Self::Private,
        }
    }

    pub fn is_private(&self) -> bool {
        matches!(self, Self::Private)
    }
}

/// Read the container ACL and classify it. A failed read is logged and
/// classified as private.
pub async fn classify(backend: &dyn BlobBackend, container: &str) -> ContainerAccess {
    let acl = match backend.get_container_acl(container).await {
        Ok(acl) => acl,
        Err(e) => {
            warn!("Reading ACL of container {} failed, treating it as private: {}", container, e);
            None
        }
    };

    let access = ContainerAccess::from_acl(acl.as_ref());
    debug!("Container {} is {:?}", container, access);
    access
}
