//! Runtime class hierarchy.
//!
//! Every entity is an instance of a class registered in the
//! [`ClassRegistry`]. Classes form a single-inheritance tree with two built-in
//! roots: [`ClassId::OBJECT`] for plain objects and [`ClassId::ACTOR`] (a child
//! of `Object`) for spatial entities. Pools match requests against this
//! hierarchy, and the automatic field reset walks it to find where each field
//! was declared.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::component::Component;
use crate::fields::FieldDescriptor;
use crate::hooks::PoolableEntity;
use crate::HostError;

// ---------------------------------------------------------------------------
// ClassId
// ---------------------------------------------------------------------------

/// Opaque identifier of a registered class.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassId(pub(crate) u32);

impl ClassId {
    /// Root of every class.
    pub const OBJECT: ClassId = ClassId(0);
    /// Root of every spatial class.
    pub const ACTOR: ClassId = ClassId(1);

    /// Raw numeric value, stable for the lifetime of the registry.
    pub fn to_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// ClassInfo
// ---------------------------------------------------------------------------

/// Produces the lifecycle hooks attached to each new instance of a class.
pub type HooksFactory = Arc<dyn Fn() -> Box<dyn PoolableEntity> + Send + Sync>;

/// Metadata about a registered class.
#[derive(Clone)]
pub struct ClassInfo {
    pub id: ClassId,
    pub name: String,
    /// `None` only for [`ClassId::OBJECT`].
    pub parent: Option<ClassId>,
    /// Package path the class was declared in, e.g. `/Game/Weapons` or
    /// `/Script/Engine`.
    pub package: String,
    /// Fields declared by this class (not inherited ones).
    pub fields: Vec<FieldDescriptor>,
    /// Components every new instance starts with.
    pub components: Vec<Component>,
    pub start_with_tick_enabled: bool,
    pub hooks: Option<HooksFactory>,
}

impl fmt::Debug for ClassInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassInfo")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("package", &self.package)
            .field("fields", &self.fields.len())
            .field("components", &self.components.len())
            .field("hooks", &self.hooks.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ClassDef builder
// ---------------------------------------------------------------------------

/// Declaration of a new class, consumed by [`ClassRegistry::register`].
#[derive(Clone)]
pub struct ClassDef {
    name: String,
    parent: ClassId,
    package: String,
    fields: Vec<FieldDescriptor>,
    components: Vec<Component>,
    start_with_tick_enabled: bool,
    hooks: Option<HooksFactory>,
}

impl ClassDef {
    /// A class declared in the project's content package.
    pub fn new(name: &str, parent: ClassId) -> Self {
        Self {
            name: name.to_owned(),
            parent,
            package: format!("/Game/Blueprints/{name}"),
            fields: Vec::new(),
            components: Vec::new(),
            start_with_tick_enabled: true,
            hooks: None,
        }
    }

    pub fn package(mut self, package: &str) -> Self {
        self.package = package.to_owned();
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn component(mut self, component: Component) -> Self {
        self.components.push(component);
        self
    }

    pub fn tick_enabled(mut self, enabled: bool) -> Self {
        self.start_with_tick_enabled = enabled;
        self
    }

    /// Attach lifecycle hooks to every instance of the class.
    pub fn hooks<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn PoolableEntity> + Send + Sync + 'static,
    {
        self.hooks = Some(Arc::new(factory));
        self
    }
}

// ---------------------------------------------------------------------------
// ClassRegistry
// ---------------------------------------------------------------------------

/// All classes known to a world.
#[derive(Debug, Clone)]
pub struct ClassRegistry {
    by_name: HashMap<String, ClassId>,
    /// Indexed by `ClassId.0`.
    infos: Vec<ClassInfo>,
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassRegistry {
    /// A registry holding only the built-in `Object` and `Actor` roots.
    pub fn new() -> Self {
        let root = |id: ClassId, name: &str, parent: Option<ClassId>| ClassInfo {
            id,
            name: name.to_owned(),
            parent,
            package: "/Script/Engine".to_owned(),
            fields: Vec::new(),
            components: Vec::new(),
            start_with_tick_enabled: false,
            hooks: None,
        };
        let infos = vec![
            root(ClassId::OBJECT, "Object", None),
            root(ClassId::ACTOR, "Actor", Some(ClassId::OBJECT)),
        ];
        let by_name = infos.iter().map(|i| (i.name.clone(), i.id)).collect();
        Self { by_name, infos }
    }

    /// Register a new class.
    pub fn register(&mut self, def: ClassDef) -> Result<ClassId, HostError> {
        if self.by_name.contains_key(&def.name) {
            return Err(HostError::DuplicateClass { name: def.name });
        }
        if self.get(def.parent).is_none() {
            return Err(HostError::UnknownClass {
                name: format!("{:?}", def.parent),
            });
        }
        let id = ClassId(self.infos.len() as u32);
        self.by_name.insert(def.name.clone(), id);
        self.infos.push(ClassInfo {
            id,
            name: def.name,
            parent: Some(def.parent),
            package: def.package,
            fields: def.fields,
            components: def.components,
            start_with_tick_enabled: def.start_with_tick_enabled,
            hooks: def.hooks,
        });
        Ok(id)
    }

    pub fn lookup(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: ClassId) -> Option<&ClassInfo> {
        self.infos.get(id.0 as usize)
    }

    /// Class name, or `"<unknown>"` for an id this registry never issued.
    pub fn name(&self, id: ClassId) -> &str {
        self.get(id).map_or("<unknown>", |i| i.name.as_str())
    }

    /// Whether `class` is `ancestor` or derives from it.
    pub fn is_child_of(&self, class: ClassId, ancestor: ClassId) -> bool {
        let mut cursor = Some(class);
        while let Some(id) = cursor {
            if id == ancestor {
                return true;
            }
            cursor = self.get(id).and_then(|i| i.parent);
        }
        false
    }

    pub fn is_actor(&self, class: ClassId) -> bool {
        self.is_child_of(class, ClassId::ACTOR)
    }

    /// Number of ancestors: `Object` is 0, `Actor` is 1.
    pub fn depth(&self, class: ClassId) -> usize {
        let mut depth = 0;
        let mut cursor = self.get(class).and_then(|i| i.parent);
        while let Some(id) = cursor {
            depth += 1;
            cursor = self.get(id).and_then(|i| i.parent);
        }
        depth
    }

    /// Every field of `class`, inherited ones first, each paired with the
    /// class that declared it.
    pub fn fields_of(&self, class: ClassId) -> Vec<(ClassId, &FieldDescriptor)> {
        let mut chain = Vec::new();
        let mut cursor = self.get(class);
        while let Some(info) = cursor {
            chain.push(info);
            cursor = info.parent.and_then(|p| self.get(p));
        }
        chain
            .into_iter()
            .rev()
            .flat_map(|info| info.fields.iter().map(move |f| (info.id, f)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
