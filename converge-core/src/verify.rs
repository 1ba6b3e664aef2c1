//! Convergence verification engine.
//!
//! Drives an ordered sequence of (configuration, expectation) steps
//! against a remote collaborator and aggregates a single pass/fail verdict
//! with first-failure short-circuiting. Steps are strictly sequential:
//! each depends on the remote mutation of the prior one. Independent runs
//! may execute in parallel against the same remote system; isolation comes
//! from distinct remote identifiers, not locking.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::checks::Check;
use crate::identity::KindSpec;
use crate::import::{ImportError, import_resource};
use crate::record::{AttrDiff, ResourceRecord, render_attr_diffs};
use crate::remote::{RemoteBackend, RemoteError};

/// Terminal failure of a convergence run. Only the first failing step is
/// reported; there is no partial continuation.
#[derive(Debug, Error)]
pub enum StepFailure {
    #[error("Step {step}: apply failed: {source}")]
    Apply { step: usize, source: RemoteError },

    #[error("Step {step}: read-back of {id} failed: {source}")]
    ReadBack {
        step: usize,
        id: String,
        source: RemoteError,
    },

    #[error("Step {step}: check '{check}' failed: {reason}")]
    Check {
        step: usize,
        check: String,
        reason: String,
    },

    #[error("Step {step}: import of '{raw_id}' failed: {source}")]
    Import {
        step: usize,
        raw_id: String,
        source: ImportError,
    },

    #[error("Step {step}: round-trip mismatch for '{raw_id}': {}", render_attr_diffs(.diffs))]
    RoundTrip {
        step: usize,
        raw_id: String,
        diffs: Vec<AttrDiff>,
    },

    #[error("Resource {id} still exists after teardown")]
    StillExists { id: String },

    #[error("Absence of {id} could not be confirmed: {source}")]
    UnconfirmedAbsence { id: String, source: RemoteError },

    #[error("Resource {id} still has {count} association(s) after teardown")]
    AssociationsRemain { id: String, count: usize },
}

/// Post-apply import probe.
///
/// Rebuilds the resource from the live composite identifier and requires
/// it to match the directly read record field for field, with pinned
/// attributes at their safe defaults.
pub struct ImportProbe {
    spec: &'static KindSpec,
    raw_id: Box<dyn Fn(&ResourceRecord) -> String + Send + Sync>,
}

impl ImportProbe {
    pub fn new(
        spec: &'static KindSpec,
        raw_id: impl Fn(&ResourceRecord) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            spec,
            raw_id: Box::new(raw_id),
        }
    }
}

/// One configuration-apply-and-verify cycle within a resource lifecycle.
pub struct ConvergenceStep<C> {
    pub config: C,
    pub checks: Vec<Check>,
    pub import_probe: Option<ImportProbe>,
}

impl<C> ConvergenceStep<C> {
    pub fn new(config: C) -> Self {
        Self {
            config,
            checks: Vec::new(),
            import_probe: None,
        }
    }

    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub fn import_probe(mut self, probe: ImportProbe) -> Self {
        self.import_probe = Some(probe);
        self
    }
}

/// Post-teardown expectation for one tracked resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestroyCheck {
    /// The read must yield the typed not-found signal. Anything found is a
    /// failure; any other error means absence was not confirmed.
    Absent(String),
    /// The resource must be gone or have exactly zero associations left.
    NoAssociations(String),
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub steps_completed: usize,
    /// Identifiers the run converged on, in first-seen order.
    pub tracked: Vec<String>,
}

/// Convergence verifier.
///
/// Stateless between runs; the backend handle is injected explicitly.
/// Performs no retries: collaborator calls are treated as already resolved
/// to a definitive outcome.
pub struct Verifier<B> {
    backend: Arc<B>,
}

impl<B: RemoteBackend> Verifier<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Execute the steps in order against one logical resource lifecycle.
    pub async fn run(
        &self,
        steps: &[ConvergenceStep<B::Config>],
    ) -> Result<RunReport, StepFailure> {
        let mut prior: Option<ResourceRecord> = None;
        let mut tracked: Vec<String> = Vec::new();

        for (step, definition) in steps.iter().enumerate() {
            debug!(step, "Applying step configuration");
            let id = self
                .backend
                .apply(&definition.config)
                .await
                .map_err(|source| StepFailure::Apply { step, source })?;
            if !tracked.contains(&id) {
                tracked.push(id.clone());
            }

            let record = self
                .backend
                .read(&id)
                .await
                .map_err(|source| StepFailure::ReadBack {
                    step,
                    id: id.clone(),
                    source,
                })?;

            for check in &definition.checks {
                if let Err(reason) = check.eval(&record, prior.as_ref()) {
                    return Err(StepFailure::Check {
                        step,
                        check: check.name().to_string(),
                        reason,
                    });
                }
            }

            if let Some(probe) = &definition.import_probe {
                self.run_probe(step, probe, &record).await?;
            }

            info!(step, id = %id, checks = definition.checks.len(), "Step converged");
            prior = Some(record);
        }

        info!(steps = steps.len(), "Convergence run complete");
        Ok(RunReport {
            steps_completed: steps.len(),
            tracked,
        })
    }

    /// Round-trip check: re-derive the record from the live identifier and
    /// compare against the record obtained by direct mutation.
    async fn run_probe(
        &self,
        step: usize,
        probe: &ImportProbe,
        direct: &ResourceRecord,
    ) -> Result<(), StepFailure> {
        let raw_id = (probe.raw_id)(direct);
        debug!(step, raw_id = %raw_id, "Running import probe");

        let (_, imported) = import_resource(self.backend.as_ref(), probe.spec, &raw_id)
            .await
            .map_err(|source| StepFailure::Import {
                step,
                raw_id: raw_id.clone(),
                source,
            })?;

        // Pinned attributes are non-derivable; the direct record must
        // match with them at their safe defaults.
        let mut expected = direct.clone();
        probe.spec.apply_defaults(&mut expected);

        let diffs = expected.diff(&imported);
        if diffs.is_empty() {
            Ok(())
        } else {
            Err(StepFailure::RoundTrip {
                step,
                raw_id,
                diffs,
            })
        }
    }

    /// Confirm that torn-down resources are gone.
    ///
    /// One remote read per tracked resource. A typed not-found is the
    /// success path here; a non-not-found error is fatal and surfaced
    /// verbatim, since it leaves the remote state ambiguous.
    pub async fn confirm_destroyed(&self, checks: &[DestroyCheck]) -> Result<(), StepFailure> {
        for check in checks {
            match check {
                DestroyCheck::Absent(id) => match self.backend.read(id).await {
                    Err(RemoteError::NotFound(_)) => {
                        debug!(id = %id, "Confirmed absent");
                    }
                    Ok(_) => {
                        return Err(StepFailure::StillExists { id: id.clone() });
                    }
                    Err(source) => {
                        return Err(StepFailure::UnconfirmedAbsence {
                            id: id.clone(),
                            source,
                        });
                    }
                },
                DestroyCheck::NoAssociations(id) => match self.backend.read(id).await {
                    Err(RemoteError::NotFound(_)) => {
                        debug!(id = %id, "Confirmed absent");
                    }
                    Ok(record) if record.associations.is_empty() => {
                        debug!(id = %id, "Confirmed no associations");
                    }
                    Ok(record) => {
                        return Err(StepFailure::AssociationsRemain {
                            id: id.clone(),
                            count: record.associations.len(),
                        });
                    }
                    Err(source) => {
                        return Err(StepFailure::UnconfirmedAbsence {
                            id: id.clone(),
                            source,
                        });
                    }
                },
            }
        }

        info!(checks = checks.len(), "Destruction confirmed");
        Ok(())
    }
}
