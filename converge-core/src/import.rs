//! Resource import: state reconstruction from an external identifier.

use thiserror::Error;
use tracing::{debug, info};

use crate::identity::{IdentityError, KindSpec, ResourceIdentity};
use crate::record::ResourceRecord;
use crate::remote::{RemoteBackend, RemoteError};

/// Import errors.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),
}

/// Reconstruct a full resource record from an external identifier.
///
/// Resolution is pure; one remote read supplies every attribute the
/// identifier does not encode. Derived attributes from the identifier take
/// precedence over the remote values, and pinned attributes are forced to
/// their safe defaults afterwards.
pub async fn import_resource<B: RemoteBackend>(
    backend: &B,
    spec: &KindSpec,
    raw_id: &str,
) -> Result<(ResourceIdentity, ResourceRecord), ImportError> {
    let identity = spec.resolve(raw_id)?;
    let key = spec.lookup_key(&identity);
    debug!(kind = spec.kind, raw = raw_id, key = %key, "Importing resource");

    let mut record = backend.read(&key).await?;
    for (name, value) in &identity.derived {
        record.attrs.insert(name.clone(), value.clone());
    }
    spec.apply_defaults(&mut record);

    info!(kind = spec.kind, id = %record.id, "Imported resource");
    Ok((identity, record))
}
