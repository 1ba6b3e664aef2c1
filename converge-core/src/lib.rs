//! converge-core: import and convergence verification engine for a
//! declarative cloud provider plugin.
//!
//! Two cooperating components, both stateless between invocations:
//! the identity resolver reconstructs full local state from an opaque
//! (possibly composite) remote identifier, and the convergence verifier
//! drives ordered configuration steps against a remote collaborator,
//! checking expectations after each step and confirming destruction at
//! teardown.

pub mod checks;
pub mod identity;
pub mod import;
pub mod kinds;
pub mod record;
pub mod remote;
pub mod test_util;
pub mod verify;

pub use checks::Check;
pub use identity::{DerivedAttr, IdentityError, KindSpec, ResourceIdentity};
pub use import::{ImportError, import_resource};
pub use record::{AttrDiff, ResourceRecord};
pub use remote::{RemoteBackend, RemoteError};
pub use verify::{
    ConvergenceStep, DestroyCheck, ImportProbe, RunReport, StepFailure, Verifier,
};
