//! In-memory remote backend for tests and tooling.
//!
//! `MemoryCloud` models just enough of a remote cloud API to exercise the
//! verifier hermetically: applies are convergent (the same alias updates
//! the same remote resource in place), associations are bookkept on the
//! parent record including removal of stale entries when a child
//! re-points, and reads of unknown identifiers yield the typed not-found
//! signal.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::record::ResourceRecord;
use crate::remote::{RemoteBackend, RemoteError, Result};

/// Desired state for one resource, already resolved by the configuration
/// layer (the core never parses configuration syntax).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesiredResource {
    pub kind: String,
    /// Local alias; repeated applies with the same alias converge on the
    /// same remote resource.
    pub alias: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
}

impl DesiredResource {
    pub fn new(kind: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            alias: alias.into(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }
}

#[derive(Default)]
struct CloudState {
    records: BTreeMap<String, ResourceRecord>,
    aliases: HashMap<String, String>,
    read_fault: Option<RemoteError>,
}

/// Hermetic in-memory cloud.
#[derive(Default)]
pub struct MemoryCloud {
    state: RwLock<CloudState>,
}

impl MemoryCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// The remote id an alias converged on, if it was ever applied.
    pub async fn id_for_alias(&self, alias: &str) -> Option<String> {
        self.state.read().await.aliases.get(alias).cloned()
    }

    /// Make every subsequent read fail with the given error, or restore
    /// normal behavior with `None`. Exercises the verifier's handling of
    /// ambiguous remote state.
    pub async fn set_read_fault(&self, fault: Option<RemoteError>) {
        self.state.write().await.read_fault = fault;
    }

    /// Harness-side teardown. The verifier itself never destroys anything;
    /// it only confirms absence afterwards.
    pub async fn remove(&self, id: &str) -> bool {
        let mut state = self.state.write().await;
        let Some(record) = state.records.remove(id) else {
            return false;
        };
        if let Some(parent_id) = record.attr("route_table_id").map(String::from) {
            detach(&mut state, &parent_id, id);
        }
        state.aliases.retain(|_, mapped| mapped != id);
        debug!(id = %id, "Removed resource");
        true
    }

    fn generate_id(config: &DesiredResource) -> String {
        // Named resources (buckets) use their name as the remote id; the
        // rest get prefixed opaque ids.
        if let Some(name) = config.attrs.get("name") {
            return name.clone();
        }
        let prefix = match config.kind.as_str() {
            "route_table" => "rtb",
            "subnet" => "subnet",
            "route_table_association" => "rtbassoc",
            other => other,
        };
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{}-{}", prefix, &suffix[..8])
    }
}

impl RemoteBackend for MemoryCloud {
    type Config = DesiredResource;

    async fn apply(&self, config: &Self::Config) -> Result<String> {
        let mut state = self.state.write().await;

        let id = match state.aliases.get(&config.alias) {
            Some(existing) => existing.clone(),
            None => Self::generate_id(config),
        };

        // Association bookkeeping happens before the record is replaced,
        // so a re-pointed child is detached from its previous parent.
        if config.kind == "route_table_association" {
            let new_parent = config
                .attrs
                .get("route_table_id")
                .cloned()
                .ok_or_else(|| {
                    RemoteError::Unexpected("association without route_table_id".to_string())
                })?;
            if !config.attrs.contains_key("subnet_id") {
                return Err(RemoteError::Unexpected(
                    "association without subnet_id".to_string(),
                ));
            }
            if !state.records.contains_key(&new_parent) {
                return Err(RemoteError::Unexpected(format!(
                    "route table {new_parent} does not exist"
                )));
            }

            let old_parent = state
                .records
                .get(&id)
                .and_then(|existing| existing.attr("route_table_id").map(String::from));
            if let Some(old_parent) = old_parent {
                if old_parent != new_parent {
                    detach(&mut state, &old_parent, &id);
                }
            }
            attach(&mut state, &new_parent, &id);
        }

        let associations = state
            .records
            .get(&id)
            .map(|existing| existing.associations.clone())
            .unwrap_or_default();
        let record = ResourceRecord {
            kind: config.kind.clone(),
            id: id.clone(),
            attrs: config.attrs.clone(),
            associations,
        };
        state.records.insert(id.clone(), record);
        state.aliases.insert(config.alias.clone(), id.clone());

        debug!(kind = %config.kind, alias = %config.alias, id = %id, "Applied configuration");
        Ok(id)
    }

    async fn read(&self, id: &str) -> Result<ResourceRecord> {
        let state = self.state.read().await;
        if let Some(fault) = &state.read_fault {
            return Err(fault.clone());
        }

        if let Some(record) = state.records.get(id) {
            return Ok(record.clone());
        }

        // Composite keys describe an association by its endpoints, the way
        // real describe calls accept filters.
        if let Some((parent, child)) = id.split_once('/') {
            if let Some(record) = state.records.values().find(|record| {
                record.kind == "route_table_association"
                    && record.attr("route_table_id") == Some(parent)
                    && record.attr("subnet_id") == Some(child)
            }) {
                return Ok(record.clone());
            }
        }

        Err(RemoteError::NotFound(id.to_string()))
    }
}

fn attach(state: &mut CloudState, parent_id: &str, child_id: &str) {
    if let Some(parent) = state.records.get_mut(parent_id) {
        if !parent.associations.iter().any(|a| a == child_id) {
            parent.associations.push(child_id.to_string());
        }
    }
}

fn detach(state: &mut CloudState, parent_id: &str, child_id: &str) {
    if let Some(parent) = state.records.get_mut(parent_id) {
        parent.associations.retain(|a| a != child_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn apply_is_convergent_per_alias() {
        let cloud = MemoryCloud::new();
        let first = cloud
            .apply(&DesiredResource::new("route_table", "rt").attr("vpc_id", "vpc-1"))
            .await
            .unwrap();
        let second = cloud
            .apply(&DesiredResource::new("route_table", "rt").attr("vpc_id", "vpc-2"))
            .await
            .unwrap();
        assert_eq!(first, second);

        let record = cloud.read(&first).await.unwrap();
        assert_eq!(record.attr("vpc_id"), Some("vpc-2"));
    }

    #[tokio::test]
    async fn repointing_an_association_detaches_the_old_parent() {
        let cloud = MemoryCloud::new();
        let rtb_a = cloud
            .apply(&DesiredResource::new("route_table", "a"))
            .await
            .unwrap();
        let rtb_b = cloud
            .apply(&DesiredResource::new("route_table", "b"))
            .await
            .unwrap();
        let subnet = cloud
            .apply(&DesiredResource::new("subnet", "s"))
            .await
            .unwrap();

        let assoc = cloud
            .apply(
                &DesiredResource::new("route_table_association", "assoc")
                    .attr("route_table_id", &rtb_a)
                    .attr("subnet_id", &subnet),
            )
            .await
            .unwrap();
        assert_eq!(cloud.read(&rtb_a).await.unwrap().associations, vec![assoc.clone()]);

        cloud
            .apply(
                &DesiredResource::new("route_table_association", "assoc")
                    .attr("route_table_id", &rtb_b)
                    .attr("subnet_id", &subnet),
            )
            .await
            .unwrap();
        assert!(cloud.read(&rtb_a).await.unwrap().associations.is_empty());
        assert_eq!(cloud.read(&rtb_b).await.unwrap().associations, vec![assoc]);
    }

    #[tokio::test]
    async fn composite_read_finds_association_by_endpoints() {
        let cloud = MemoryCloud::new();
        let rtb = cloud
            .apply(&DesiredResource::new("route_table", "rt"))
            .await
            .unwrap();
        let subnet = cloud
            .apply(&DesiredResource::new("subnet", "s"))
            .await
            .unwrap();
        let assoc = cloud
            .apply(
                &DesiredResource::new("route_table_association", "assoc")
                    .attr("route_table_id", &rtb)
                    .attr("subnet_id", &subnet),
            )
            .await
            .unwrap();

        let record = cloud.read(&format!("{rtb}/{subnet}")).await.unwrap();
        assert_eq!(record.id, assoc);
    }

    #[tokio::test]
    async fn unknown_ids_yield_typed_not_found() {
        let cloud = MemoryCloud::new();
        let err = cloud.read("rtb-missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn remove_detaches_and_forgets_aliases() {
        let cloud = MemoryCloud::new();
        let rtb = cloud
            .apply(&DesiredResource::new("route_table", "rt"))
            .await
            .unwrap();
        let subnet = cloud
            .apply(&DesiredResource::new("subnet", "s"))
            .await
            .unwrap();
        let assoc = cloud
            .apply(
                &DesiredResource::new("route_table_association", "assoc")
                    .attr("route_table_id", &rtb)
                    .attr("subnet_id", &subnet),
            )
            .await
            .unwrap();

        assert!(cloud.remove(&assoc).await);
        assert!(cloud.read(&assoc).await.unwrap_err().is_not_found());
        assert!(cloud.read(&rtb).await.unwrap().associations.is_empty());
        assert_eq!(cloud.id_for_alias("assoc").await, None);
        assert!(!cloud.remove(&assoc).await);
    }
}
