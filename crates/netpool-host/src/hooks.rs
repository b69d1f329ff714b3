//! Optional pooling lifecycle hooks.
//!
//! An entity opts into pooling notifications by carrying a
//! [`PoolableEntity`] implementation, attached per instance by its class's
//! hooks factory (see [`ClassDef::hooks`](crate::class::ClassDef::hooks)).
//! Every operation has a no-op default, so an implementation only overrides
//! what it cares about. Entities without hooks get the default behaviour.

use crate::entity::EntityId;
use crate::fields::FieldStore;

/// Which lifecycle notification to deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolHook {
    Construct,
    Activate,
    Deactivate,
}

/// Capability an entity implements to observe being pooled.
pub trait PoolableEntity: Send {
    /// Called once the entity has been handed out by a pool, before it is
    /// finished (positioned and enabled).
    fn on_pool_construct(&mut self, _entity: EntityId, _fields: &mut FieldStore) {}

    /// Called when the entity becomes active in the world.
    fn on_pool_activate(&mut self, _entity: EntityId, _fields: &mut FieldStore) {}

    /// Called just before the entity goes back to its pool.
    fn on_pool_deactivate(&mut self, _entity: EntityId, _fields: &mut FieldStore) {}

    /// Names of fields the automatic reset must leave untouched.
    fn reset_exclude_list(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Counts every hook invocation. Handy for tests and diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookCounters {
    pub constructed: u32,
    pub activated: u32,
    pub deactivated: u32,
}

/// Hooks that only record how often each notification fired, mirroring the
/// counters into the entity's fields (`pool_constructs`, `pool_activations`,
/// `pool_deactivations`) so they can be inspected from outside.
#[derive(Debug, Clone, Default)]
pub struct CountingHooks {
    pub counters: HookCounters,
    pub exclude: Vec<String>,
}

impl CountingHooks {
    pub fn excluding(names: &[&str]) -> Self {
        Self {
            counters: HookCounters::default(),
            exclude: names.iter().map(|n| (*n).to_owned()).collect(),
        }
    }
}

impl PoolableEntity for CountingHooks {
    fn on_pool_construct(&mut self, _entity: EntityId, fields: &mut FieldStore) {
        self.counters.constructed += 1;
        fields.set(
            "pool_constructs",
            crate::fields::FieldValue::Int(self.counters.constructed.into()),
        );
    }

    fn on_pool_activate(&mut self, _entity: EntityId, fields: &mut FieldStore) {
        self.counters.activated += 1;
        fields.set(
            "pool_activations",
            crate::fields::FieldValue::Int(self.counters.activated.into()),
        );
    }

    fn on_pool_deactivate(&mut self, _entity: EntityId, fields: &mut FieldStore) {
        self.counters.deactivated += 1;
        fields.set(
            "pool_deactivations",
            crate::fields::FieldValue::Int(self.counters.deactivated.into()),
        );
    }

    fn reset_exclude_list(&self) -> Vec<String> {
        self.exclude.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldValue;

    struct Silent;
    impl PoolableEntity for Silent {}

    #[test]
    fn default_hooks_do_nothing() {
        let mut hooks = Silent;
        let mut fields = FieldStore::new();
        hooks.on_pool_construct(EntityId::new(0, 0), &mut fields);
        hooks.on_pool_activate(EntityId::new(0, 0), &mut fields);
        assert!(fields.is_empty());
        assert!(hooks.reset_exclude_list().is_empty());
    }

    #[test]
    fn counting_hooks_mirror_into_fields() {
        let mut hooks = CountingHooks::excluding(&["score"]);
        let mut fields = FieldStore::new();
        let e = EntityId::new(1, 0);
        hooks.on_pool_activate(e, &mut fields);
        hooks.on_pool_activate(e, &mut fields);
        hooks.on_pool_deactivate(e, &mut fields);
        assert_eq!(fields.get("pool_activations"), Some(&FieldValue::Int(2)));
        assert_eq!(fields.get("pool_deactivations"), Some(&FieldValue::Int(1)));
        assert_eq!(hooks.reset_exclude_list(), vec!["score".to_owned()]);
    }
}
