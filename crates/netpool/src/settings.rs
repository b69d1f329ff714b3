//! Pool configuration.
//!
//! [`PoolSettings`] is read once at session start, usually from a JSON file,
//! and never changes afterwards. Every [`PoolSpec`] names its classes by
//! string; [`PoolSettings::resolve`] turns those names into [`ClassId`]s
//! against the host's class registry and rejects specs the pools could never
//! honour.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use netpool_host::class::{ClassId, ClassRegistry};

use crate::pool::PoolFlavor;
use crate::PoolError;

fn yes() -> bool {
    true
}

// ---------------------------------------------------------------------------
// PoolSpec
// ---------------------------------------------------------------------------

/// Declaration of one configured pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSpec {
    /// Human-readable pool name, used in logs.
    pub name: String,
    #[serde(default)]
    pub flavor: PoolFlavor,
    /// Name of the class the pool serves.
    pub target_class: String,
    /// Whether requests for subclasses of `target_class` may use this pool.
    #[serde(default = "yes")]
    pub include_child_classes: bool,
    /// Skip the pool entirely on observers; they receive it from the
    /// authority instead.
    #[serde(default = "yes")]
    pub authority_only: bool,
    /// Classes to warm up. Empty means the target class.
    #[serde(default)]
    pub preallocate_classes: Vec<String>,
    /// Entities to warm up per class.
    #[serde(default)]
    pub preallocate_count: u32,
}

impl PoolSpec {
    /// An actor pool for `target_class` with every option at its default.
    pub fn actor(name: &str, target_class: &str) -> Self {
        Self {
            name: name.to_owned(),
            flavor: PoolFlavor::Actor,
            target_class: target_class.to_owned(),
            include_child_classes: true,
            authority_only: true,
            preallocate_classes: Vec::new(),
            preallocate_count: 0,
        }
    }

    /// An object pool for `target_class` with every option at its default.
    pub fn object(name: &str, target_class: &str) -> Self {
        Self {
            flavor: PoolFlavor::Object,
            ..Self::actor(name, target_class)
        }
    }

    pub fn preallocate(mut self, count: u32) -> Self {
        self.preallocate_count = count;
        self
    }

    pub fn preallocate_classes(mut self, classes: &[&str]) -> Self {
        self.preallocate_classes = classes.iter().map(|c| (*c).to_owned()).collect();
        self
    }

    pub fn include_child_classes(mut self, include: bool) -> Self {
        self.include_child_classes = include;
        self
    }

    pub fn authority_only(mut self, authority_only: bool) -> Self {
        self.authority_only = authority_only;
        self
    }
}

/// A [`PoolSpec`] whose class names have been resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPoolSpec {
    pub name: String,
    pub flavor: PoolFlavor,
    pub target_class: ClassId,
    pub include_child_classes: bool,
    pub authority_only: bool,
    pub preallocate_classes: Vec<ClassId>,
    pub preallocate_count: u32,
}

// ---------------------------------------------------------------------------
// PoolSettings
// ---------------------------------------------------------------------------

/// Session-wide pooling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    pub pools: Vec<PoolSpec>,
    /// Reset eligible fields of every returned entity to their class defaults.
    pub use_automatic_property_reset: bool,
    /// Name of the project module; classes under `/Script/<project_name>`
    /// count as project classes for the automatic reset.
    pub project_name: String,
    /// Modular feature packages whose `/<Feature>/Game/...` content also
    /// counts as project content.
    pub feature_packages: Vec<String>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            pools: Vec::new(),
            use_automatic_property_reset: true,
            project_name: String::new(),
            feature_packages: Vec::new(),
        }
    }
}

impl PoolSettings {
    pub fn with_pool(mut self, spec: PoolSpec) -> Self {
        self.pools.push(spec);
        self
    }

    /// Parse settings from a JSON document.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("invalid pool settings")
    }

    /// Load settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read pool settings from {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("in {}", path.display()))
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Resolve every spec's class names against `classes`.
    ///
    /// Actor pools must target an actor class and object pools a non-actor
    /// class; warm-up classes must exist.
    pub fn resolve(&self, classes: &ClassRegistry) -> Result<Vec<ResolvedPoolSpec>, PoolError> {
        self.pools
            .iter()
            .map(|spec| resolve_spec(spec, classes))
            .collect()
    }
}

fn resolve_spec(spec: &PoolSpec, classes: &ClassRegistry) -> Result<ResolvedPoolSpec, PoolError> {
    let lookup = |name: &str| {
        classes.lookup(name).ok_or_else(|| PoolError::InvalidSpec {
            pool: spec.name.clone(),
            reason: format!("class '{name}' is not registered"),
        })
    };

    let target_class = lookup(&spec.target_class)?;
    let is_actor = classes.is_actor(target_class);
    match spec.flavor {
        PoolFlavor::Actor if !is_actor => {
            return Err(PoolError::InvalidSpec {
                pool: spec.name.clone(),
                reason: format!("actor pool target '{}' is not an actor class", spec.target_class),
            });
        }
        PoolFlavor::Object if is_actor => {
            return Err(PoolError::InvalidSpec {
                pool: spec.name.clone(),
                reason: format!("object pool target '{}' is an actor class", spec.target_class),
            });
        }
        _ => {}
    }

    let preallocate_classes = spec
        .preallocate_classes
        .iter()
        .map(|name| lookup(name))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ResolvedPoolSpec {
        name: spec.name.clone(),
        flavor: spec.flavor,
        target_class,
        include_child_classes: spec.include_child_classes,
        authority_only: spec.authority_only,
        preallocate_classes,
        preallocate_count: spec.preallocate_count,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
