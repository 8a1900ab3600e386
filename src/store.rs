//! Entity store (E) and cluster store (C): one JSON file per record under a
//! tenant-scoped directory tree (spec §2, §9 "Persistence is file-per-entity,
//! not a single blob").
//!
//! Grounded on the teacher's `session_handoff` loader
//! (`aetherlight-core/src/session_handoff/loader.rs`): read-whole-file ->
//! `serde_json::from_str`, write via a temp-file-then-rename so a crash mid
//! write never leaves a truncated record, and a flat directory layout keyed
//! by id. Generalized here from a single handoff blob to many independently
//! addressable entity/cluster files plus a small id-counter ledger.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cluster::SignalCluster;
use crate::entity::{Entity, EntityType};
use crate::error::{Error, Result};
use crate::spoke::Spoke;

#[derive(Debug, Default, Serialize, Deserialize)]
struct IdCounters {
    #[serde(default)]
    counters: HashMap<String, u64>,
}

/// Uppercase initial of every whitespace token in `name` (spec §8 scenario 1:
/// "Zenobia Quark" -> "ZQ"). A blank name yields "X", keeping the id grammar
/// well-formed even for the pathological case the resolver already rejects
/// before this is ever called.
fn initials_of(name: &str) -> String {
    let letters: String = name
        .split_whitespace()
        .filter_map(|token| token.chars().next())
        .flat_map(|c| c.to_uppercase())
        .collect();
    if letters.is_empty() {
        "X".to_string()
    } else {
        letters
    }
}

/// File-backed store for a single tenant's entities, signal clusters, and
/// spokes. Not thread-safe across processes; concurrent access within one
/// process is the caller's responsibility (spec §5 concurrency model —
/// single-writer-per-cluster).
pub struct EntityStore {
    root: PathBuf,
}

impl EntityStore {
    /// Open (creating if absent) a tenant store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("entities"))?;
        fs::create_dir_all(root.join("signal_clusters"))?;
        let store = EntityStore { root };
        if !store.spokes_path().exists() {
            store.save_spokes(&[Spoke::default_spoke()])?;
        }
        if !store.counters_path().exists() {
            store.save_counters(&IdCounters::default())?;
        }
        Ok(store)
    }

    fn entity_path(&self, entity_id: &str) -> PathBuf {
        self.root.join("entities").join(format!("{entity_id}.json"))
    }

    fn cluster_path(&self, cluster_id: &str) -> PathBuf {
        self.root
            .join("signal_clusters")
            .join(format!("{cluster_id}.json"))
    }

    fn spokes_path(&self) -> PathBuf {
        self.root.join("spokes.json")
    }

    fn counters_path(&self) -> PathBuf {
        self.root.join("id_counters.json")
    }

    fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    // -- Entities ---------------------------------------------------------

    pub fn put_entity(&self, entity: &Entity) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(entity)?;
        Self::write_atomic(&self.entity_path(&entity.entity_id), &bytes)?;
        debug!(entity_id = %entity.entity_id, "entity persisted");
        Ok(())
    }

    pub fn get_entity(&self, entity_id: &str) -> Result<Entity> {
        let path = self.entity_path(entity_id);
        let bytes = fs::read(&path).map_err(|_| Error::not_found("entity", entity_id))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn entity_exists(&self, entity_id: &str) -> bool {
        self.entity_path(entity_id).exists()
    }

    pub fn list_entities(&self) -> Result<Vec<Entity>> {
        self.list_dir_as(&self.root.join("entities"))
    }

    pub fn list_entities_by_type(&self, entity_type: EntityType) -> Result<Vec<Entity>> {
        Ok(self
            .list_entities()?
            .into_iter()
            .filter(|e| e.entity_type == entity_type)
            .collect())
    }

    /// Allocate the next id for `entity_type`, of the form
    /// `<prefix>-<INITIALS>-<seq:03>` (spec §3/§4.5.3; §8 scenario 1:
    /// "Zenobia Quark" -> `ENT-ZQ-001`).
    ///
    /// DESIGN DECISION: scope the sequence counter to the exact
    /// `<prefix>-<INITIALS>` pair, not to `entity_type` alone.
    /// WHY: the spec's id grammar has no separate disambiguation field for
    /// same-initials entities — the trailing `-<seq:03>` *is* the only
    /// disambiguator, so it has to be counted per-initials rather than
    /// globally per type, or the second "Zane Quill" in a tenant would get
    /// the same `ENT-ZQ-001` as an unrelated "Zenobia Quark".
    /// REASONING CHAIN:
    /// 1. Counting per entity_type alone ("next Person id") would hand out
    ///    `ENT-0001`, `ENT-0002`, ... with initials appended cosmetically —
    ///    two different people could still read as the same id prefix if a
    ///    caller ever truncated to the counter.
    /// 2. Counting per `<prefix>-<INITIALS>` means the counter itself is the
    ///    collision-disambiguator: "Zenobia Quark" gets `ENT-ZQ-001`, a
    ///    later unrelated "Zane Quill" gets `ENT-ZQ-002`, and the ids stay
    ///    distinct without inventing a field the spec doesn't have.
    pub fn next_entity_id(&mut self, entity_type: EntityType, primary_name: &str) -> Result<String> {
        let mut counters = self.load_counters()?;
        let initials = initials_of(primary_name);
        let key = format!("{}-{}", entity_type.id_prefix(), initials);
        let next = counters.counters.entry(key.clone()).or_insert(0);
        *next += 1;
        let id = format!("{}-{:03}", key, *next);
        self.save_counters(&counters)?;
        Ok(id)
    }

    fn load_counters(&self) -> Result<IdCounters> {
        let bytes = fs::read(self.counters_path())?;
        Ok(serde_json::from_slice(&bytes).unwrap_or_default())
    }

    fn save_counters(&self, counters: &IdCounters) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(counters)?;
        Self::write_atomic(&self.counters_path(), &bytes)
    }

    // -- Signal clusters ----------------------------------------------------

    pub fn put_cluster(&self, cluster: &SignalCluster) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(cluster)?;
        Self::write_atomic(&self.cluster_path(&cluster.cluster_id), &bytes)?;
        Ok(())
    }

    pub fn get_cluster(&self, cluster_id: &str) -> Result<SignalCluster> {
        let path = self.cluster_path(cluster_id);
        let bytes = fs::read(&path).map_err(|_| Error::not_found("signal_cluster", cluster_id))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn list_unresolved_clusters(&self) -> Result<Vec<SignalCluster>> {
        let all: Vec<SignalCluster> = self.list_dir_as(&self.root.join("signal_clusters"))?;
        Ok(all.into_iter().filter(|c| !c.is_resolved()).collect())
    }

    pub fn list_clusters(&self) -> Result<Vec<SignalCluster>> {
        self.list_dir_as(&self.root.join("signal_clusters"))
    }

    // -- Spokes -------------------------------------------------------------

    pub fn list_spokes(&self) -> Result<Vec<Spoke>> {
        let bytes = fs::read(self.spokes_path())?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn get_spoke(&self, spoke_id: &str) -> Result<Spoke> {
        self.list_spokes()?
            .into_iter()
            .find(|s| s.spoke_id == spoke_id)
            .ok_or_else(|| Error::not_found("spoke", spoke_id))
    }

    pub fn put_spoke(&self, spoke: Spoke) -> Result<()> {
        let mut spokes = self.list_spokes()?;
        if let Some(existing) = spokes.iter_mut().find(|s| s.spoke_id == spoke.spoke_id) {
            *existing = spoke;
        } else {
            spokes.push(spoke);
        }
        self.save_spokes(&spokes)
    }

    fn save_spokes(&self, spokes: &[Spoke]) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(spokes)?;
        Self::write_atomic(&self.spokes_path(), &bytes)
    }

    // -- helpers --------------------------------------------------------

    fn list_dir_as<T: for<'de> Deserialize<'de>>(&self, dir: &Path) -> Result<Vec<T>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match fs::read(&path) {
                Ok(bytes) => match serde_json::from_slice(&bytes) {
                    Ok(value) => out.push(value),
                    Err(err) => warn!(?path, %err, "skipping unreadable record"),
                },
                Err(err) => warn!(?path, %err, "skipping unreadable record"),
            }
        }
        Ok(out)
    }
}
