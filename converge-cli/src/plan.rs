//! JSON convergence plans.
//!
//! A plan drives the verifier from a file instead of a test body: a setup
//! section applies the surrounding resources, the steps section runs the
//! lifecycle under test, and an optional teardown section removes tracked
//! resources and confirms their destruction. Attribute values (and check
//! values) of the form `@alias` are replaced with the remote id that alias
//! converged on; the real configuration layer would interpolate these
//! before the core ever sees them, so the substitution lives here in the
//! harness, not in the core.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use converge_core::test_util::{DesiredResource, MemoryCloud};
use converge_core::{
    Check, ConvergenceStep, DestroyCheck, ImportProbe, RemoteBackend, Verifier, checks, kinds,
};

#[derive(Debug, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub setup: Vec<DesiredResource>,
    pub steps: Vec<PlanStep>,
    #[serde(default)]
    pub teardown: Option<Teardown>,
}

#[derive(Debug, Deserialize)]
pub struct PlanStep {
    pub config: DesiredResource,
    #[serde(default)]
    pub checks: Vec<CheckSpec>,
    #[serde(default)]
    pub import: Option<ImportSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckSpec {
    Exists,
    AttrEquals { attr: String, value: String },
    HasAssociations,
    NoAssociations,
    AssociatedWith { id: String },
    SameIdAsPrior,
}

#[derive(Debug, Deserialize)]
pub struct ImportSpec {
    pub kind: String,
    /// Attributes whose live values form the composite identifier, joined
    /// by the kind separator. Empty means the plain record id.
    #[serde(default)]
    pub id_attrs: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Teardown {
    #[serde(default)]
    pub remove: Vec<String>,
    #[serde(default)]
    pub confirm_absent: Vec<String>,
    #[serde(default)]
    pub confirm_no_associations: Vec<String>,
}

/// Load and execute a plan file against a fresh in-memory cloud.
pub async fn execute(path: &Path) -> Result<()> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read plan file {}", path.display()))?;
    let plan: Plan = serde_json::from_str(&raw).context("Invalid plan file")?;
    run_plan(plan).await
}

async fn run_plan(plan: Plan) -> Result<()> {
    let cloud = Arc::new(MemoryCloud::new());

    for config in &plan.setup {
        let resolved = substitute(&cloud, config).await?;
        let id = cloud.apply(&resolved).await?;
        info!(alias = %config.alias, id = %id, "Setup resource applied");
    }

    let mut steps = Vec::new();
    for step in &plan.steps {
        let config = substitute(&cloud, &step.config).await?;
        let mut converged = ConvergenceStep::new(config);
        for spec in &step.checks {
            converged = converged.check(build_check(&cloud, spec).await?);
        }
        if let Some(import) = &step.import {
            converged = converged.import_probe(build_probe(import)?);
        }
        steps.push(converged);
    }

    let verifier = Verifier::new(Arc::clone(&cloud));
    let report = verifier.run(&steps).await?;
    info!(steps = report.steps_completed, "Plan steps converged");

    if let Some(teardown) = &plan.teardown {
        // Resolve ids before removal; afterwards the aliases are gone.
        let mut destroy_checks = Vec::new();
        for alias in &teardown.confirm_absent {
            destroy_checks.push(DestroyCheck::Absent(resolve_alias(&cloud, alias).await?));
        }
        for alias in &teardown.confirm_no_associations {
            destroy_checks.push(DestroyCheck::NoAssociations(
                resolve_alias(&cloud, alias).await?,
            ));
        }

        for alias in &teardown.remove {
            let id = resolve_alias(&cloud, alias).await?;
            cloud.remove(&id).await;
            info!(alias = %alias, id = %id, "Removed resource");
        }

        verifier.confirm_destroyed(&destroy_checks).await?;
        info!(checks = destroy_checks.len(), "Teardown confirmed");
    }

    Ok(())
}

async fn build_check(cloud: &MemoryCloud, spec: &CheckSpec) -> Result<Check> {
    Ok(match spec {
        CheckSpec::Exists => checks::exists(),
        CheckSpec::AttrEquals { attr, value } => {
            checks::attr_equals(attr.clone(), substitute_value(cloud, value).await?)
        }
        CheckSpec::HasAssociations => checks::has_associations(),
        CheckSpec::NoAssociations => checks::no_associations(),
        CheckSpec::AssociatedWith { id } => {
            checks::associated_with(substitute_value(cloud, id).await?)
        }
        CheckSpec::SameIdAsPrior => checks::same_id_as_prior(),
    })
}

fn build_probe(import: &ImportSpec) -> Result<ImportProbe> {
    let spec = kinds::lookup(&import.kind)?;
    let id_attrs = import.id_attrs.clone();
    let separator = spec.separator.to_string();
    Ok(ImportProbe::new(spec, move |record| {
        if id_attrs.is_empty() {
            record.id.clone()
        } else {
            id_attrs
                .iter()
                .map(|attr| record.attr(attr).unwrap_or_default().to_string())
                .collect::<Vec<_>>()
                .join(&separator)
        }
    }))
}

async fn resolve_alias(cloud: &MemoryCloud, alias: &str) -> Result<String> {
    cloud
        .id_for_alias(alias)
        .await
        .with_context(|| format!("Unknown alias: {alias}"))
}

async fn substitute_value(cloud: &MemoryCloud, value: &str) -> Result<String> {
    match value.strip_prefix('@') {
        Some(alias) => resolve_alias(cloud, alias).await,
        None => Ok(value.to_string()),
    }
}

async fn substitute(cloud: &MemoryCloud, config: &DesiredResource) -> Result<DesiredResource> {
    let mut resolved = config.clone();
    let mut attrs = BTreeMap::new();
    for (name, value) in &config.attrs {
        attrs.insert(name.clone(), substitute_value(cloud, value).await?);
    }
    resolved.attrs = attrs;
    Ok(resolved)
}
