//! Stock predicates over resource records.
//!
//! A check is deterministic and side-effect-free given identical remote
//! reads. Checks receive the record read back for the current step and,
//! when one exists, the record from the prior step.

use crate::record::ResourceRecord;

/// Outcome of a single check: pass, or fail with a human-readable reason.
pub type CheckResult = Result<(), String>;

type CheckFn = Box<dyn Fn(&ResourceRecord, Option<&ResourceRecord>) -> CheckResult + Send + Sync>;

/// A named predicate over a resource record.
pub struct Check {
    name: String,
    run: CheckFn,
}

impl Check {
    pub fn new(
        name: impl Into<String>,
        run: impl Fn(&ResourceRecord, Option<&ResourceRecord>) -> CheckResult
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            run: Box::new(run),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn eval(&self, current: &ResourceRecord, prior: Option<&ResourceRecord>) -> CheckResult {
        (self.run)(current, prior)
    }
}

/// The resource exists and carries an id.
pub fn exists() -> Check {
    Check::new("exists", |record, _| {
        if record.id.is_empty() {
            Err("no id is set".to_string())
        } else {
            Ok(())
        }
    })
}

/// A named attribute equals the expected value.
pub fn attr_equals(name: impl Into<String>, value: impl Into<String>) -> Check {
    let name = name.into();
    let value = value.into();
    Check::new(format!("attr_equals({name})"), move |record, _| {
        match record.attr(&name) {
            Some(actual) if actual == value => Ok(()),
            Some(actual) => Err(format!("{name} is '{actual}', expected '{value}'")),
            None => Err(format!("{name} is absent, expected '{value}'")),
        }
    })
}

/// The resource has at least one association.
pub fn has_associations() -> Check {
    Check::new("has_associations", |record, _| {
        if record.associations.is_empty() {
            Err("no associations".to_string())
        } else {
            Ok(())
        }
    })
}

/// The resource has no associations left (e.g. no stale ones remain after
/// a child re-pointed elsewhere).
pub fn no_associations() -> Check {
    Check::new("no_associations", |record, _| {
        if record.associations.is_empty() {
            Ok(())
        } else {
            Err(format!("{} association(s) remain", record.associations.len()))
        }
    })
}

/// A specific id appears among the resource's associations.
pub fn associated_with(id: impl Into<String>) -> Check {
    let id = id.into();
    Check::new(format!("associated_with({id})"), move |record, _| {
        if record.associations.iter().any(|a| a == &id) {
            Ok(())
        } else {
            Err(format!("{id} is not associated"))
        }
    })
}

/// The record kept the same remote id as the prior step (the mutation
/// converged in place instead of recreating the resource).
pub fn same_id_as_prior() -> Check {
    Check::new("same_id_as_prior", |record, prior| match prior {
        Some(prior) if prior.id == record.id => Ok(()),
        Some(prior) => Err(format!("id changed from '{}' to '{}'", prior.id, record.id)),
        None => Err("no prior record".to_string()),
    })
}
