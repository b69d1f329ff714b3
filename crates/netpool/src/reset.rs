//! Automatic field reset.
//!
//! When an entity goes back to its pool, every eligible field declared by a
//! project class is copied back from the class default. Fields declared by
//! engine base classes are left alone, as are transient fields, fields the
//! entity excludes through its hooks, and anything whose type may hold
//! references into engine-owned object graphs.

use std::collections::HashSet;

use netpool_host::class::{ClassId, ClassRegistry};
use netpool_host::entity::EntityId;
use netpool_host::fields::{FieldType, FieldValue};
use netpool_host::world::HostWorld;

use crate::settings::PoolSettings;

// ---------------------------------------------------------------------------
// PackageClassifier
// ---------------------------------------------------------------------------

/// Decides whether a package path belongs to the project or to the engine.
#[derive(Debug, Clone, Default)]
pub struct PackageClassifier {
    project_name: String,
    feature_packages: HashSet<String>,
}

impl PackageClassifier {
    pub fn new(project_name: &str, feature_packages: &[String]) -> Self {
        Self {
            project_name: project_name.to_owned(),
            feature_packages: feature_packages.iter().cloned().collect(),
        }
    }

    /// `/Game/...` content, `/Script/<Project>` code, or
    /// `/<Feature>/Game/...` content of a registered feature package.
    pub fn is_project_package(&self, package: &str) -> bool {
        if let Some(feature) = feature_name(package) {
            if self.feature_packages.contains(feature) {
                return true;
            }
        }
        if package.starts_with("/Game/") {
            return true;
        }
        !self.project_name.is_empty()
            && package.starts_with(&format!("/Script/{}", self.project_name))
    }

    pub fn is_project_class(&self, classes: &ClassRegistry, class: ClassId) -> bool {
        classes
            .get(class)
            .is_some_and(|info| self.is_project_package(&info.package))
    }
}

/// `"/ShooterCore/Game/Weapons"` -> `Some("ShooterCore")`.
fn feature_name(package: &str) -> Option<&str> {
    let (left, _) = package.split_once("/Game/")?;
    let (_, name) = left.split_once('/')?;
    (!name.is_empty()).then_some(name)
}

/// Booleans, numbers and plain-old-data aggregates, or arrays of those.
pub fn is_resettable(ty: &FieldType) -> bool {
    match ty {
        FieldType::Bool | FieldType::Int | FieldType::Float => true,
        FieldType::Struct { plain_old_data } => *plain_old_data,
        FieldType::Array(inner) => is_resettable(inner),
        FieldType::Text | FieldType::Reference => false,
    }
}

// ---------------------------------------------------------------------------
// FieldReset
// ---------------------------------------------------------------------------

/// The reset step run on every return.
#[derive(Debug, Clone)]
pub struct FieldReset {
    enabled: bool,
    classifier: PackageClassifier,
}

impl Default for FieldReset {
    fn default() -> Self {
        Self {
            enabled: true,
            classifier: PackageClassifier::default(),
        }
    }
}

impl FieldReset {
    pub fn new(enabled: bool, classifier: PackageClassifier) -> Self {
        Self {
            enabled,
            classifier,
        }
    }

    pub fn from_settings(settings: &PoolSettings) -> Self {
        Self::new(
            settings.use_automatic_property_reset,
            PackageClassifier::new(&settings.project_name, &settings.feature_packages),
        )
    }

    /// A reset that never touches anything.
    pub fn disabled() -> Self {
        Self::new(false, PackageClassifier::default())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn classifier(&self) -> &PackageClassifier {
        &self.classifier
    }

    /// Reset the eligible fields of `entity`. Returns how many were written.
    pub fn apply(&self, world: &mut dyn HostWorld, entity: EntityId) -> usize {
        if !self.enabled {
            return 0;
        }
        let Some(record) = world.entity(entity) else {
            return 0;
        };
        let exclude = record.reset_exclude_list();
        let classes = world.classes();
        let defaults: Vec<(String, FieldValue)> = classes
            .fields_of(record.class)
            .into_iter()
            .filter(|(declared_in, field)| {
                !field.transient
                    && !exclude.iter().any(|name| *name == field.name)
                    && is_resettable(&field.ty)
                    && self.classifier.is_project_class(classes, *declared_in)
            })
            .map(|(_, field)| (field.name.clone(), field.default.clone()))
            .collect();

        let Some(record) = world.entity_mut(entity) else {
            return 0;
        };
        let written = defaults.len();
        for (name, value) in defaults {
            record.fields.set(&name, value);
        }
        tracing::trace!(entity = %entity, fields = written, "reset fields to class defaults");
        written
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use netpool_host::prelude::*;

    // -- 1. Package classification ------------------------------------------

    #[test]
    fn classifier_recognises_project_packages() {
        let classifier = PackageClassifier::new("Shooter", &["ShooterCore".to_owned()]);
        assert!(classifier.is_project_package("/Game/Weapons/BP_Rifle"));
        assert!(classifier.is_project_package("/Script/Shooter"));
        assert!(classifier.is_project_package("/ShooterCore/Game/Weapons/BP_Rocket"));
        assert!(!classifier.is_project_package("/Script/Engine"));
        assert!(!classifier.is_project_package("/OtherPlugin/Game/Thing"));
        assert!(!classifier.is_project_package("/Game"));
    }

    #[test]
    fn feature_name_extraction() {
        assert_eq!(feature_name("/ShooterCore/Game/X"), Some("ShooterCore"));
        assert_eq!(feature_name("/Game/X"), None);
        assert_eq!(feature_name("/Script/Engine"), None);
    }

    // -- 2. Eligibility -----------------------------------------------------

    #[test]
    fn resettable_types() {
        assert!(is_resettable(&FieldType::Bool));
        assert!(is_resettable(&FieldType::Float));
        assert!(is_resettable(&FieldType::Struct { plain_old_data: true }));
        assert!(!is_resettable(&FieldType::Struct { plain_old_data: false }));
        assert!(!is_resettable(&FieldType::Text));
        assert!(!is_resettable(&FieldType::Reference));
        assert!(is_resettable(&FieldType::Array(Box::new(FieldType::Int))));
        assert!(!is_resettable(&FieldType::Array(Box::new(FieldType::Reference))));
    }

    // -- 3. Applying the reset ----------------------------------------------

    fn world_with_grenade() -> (World, EntityId) {
        let mut world = World::new(NetRole::Authority);
        let engine_base = world
            .classes_mut()
            .register(
                ClassDef::new("EngineProjectile", ClassId::ACTOR)
                    .package("/Script/Engine")
                    .field(FieldDescriptor::new("bounces", FieldType::Int, FieldValue::Int(0))),
            )
            .unwrap();
        let grenade = world
            .classes_mut()
            .register(
                ClassDef::new("Grenade", engine_base)
                    .field(FieldDescriptor::new("fuse", FieldType::Float, FieldValue::Float(3.0)))
                    .field(FieldDescriptor::new("armed", FieldType::Bool, FieldValue::Bool(false)))
                    .field(
                        FieldDescriptor::new("spin", FieldType::Float, FieldValue::Float(0.0))
                            .transient(),
                    )
                    .field(FieldDescriptor::new(
                        "label",
                        FieldType::Text,
                        FieldValue::Text("grenade".into()),
                    ))
                    .field(FieldDescriptor::new(
                        "kills",
                        FieldType::Int,
                        FieldValue::Int(0),
                    ))
                    .hooks(|| Box::new(CountingHooks::excluding(&["kills"]))),
            )
            .unwrap();
        let e = world.spawn_deferred(grenade, None).unwrap();
        let fields = &mut world.entity_mut(e).unwrap().fields;
        fields.set("bounces", FieldValue::Int(4));
        fields.set("fuse", FieldValue::Float(0.5));
        fields.set("armed", FieldValue::Bool(true));
        fields.set("spin", FieldValue::Float(9.0));
        fields.set("label", FieldValue::Text("dud".into()));
        fields.set("kills", FieldValue::Int(2));
        (world, e)
    }

    #[test]
    fn reset_restores_only_eligible_project_fields() {
        let (mut world, e) = world_with_grenade();
        let written = FieldReset::default().apply(&mut world, e);
        assert_eq!(written, 2);

        let fields = &world.entity(e).unwrap().fields;
        assert_eq!(fields.get("fuse"), Some(&FieldValue::Float(3.0)));
        assert_eq!(fields.get("armed"), Some(&FieldValue::Bool(false)));
        // Engine-declared, transient, reference-bearing and excluded fields
        // keep their live values.
        assert_eq!(fields.get("bounces"), Some(&FieldValue::Int(4)));
        assert_eq!(fields.get("spin"), Some(&FieldValue::Float(9.0)));
        assert_eq!(fields.get("label"), Some(&FieldValue::Text("dud".into())));
        assert_eq!(fields.get("kills"), Some(&FieldValue::Int(2)));
    }

    #[test]
    fn disabled_reset_writes_nothing() {
        let (mut world, e) = world_with_grenade();
        assert_eq!(FieldReset::disabled().apply(&mut world, e), 0);
        let fields = &world.entity(e).unwrap().fields;
        assert_eq!(fields.get("fuse"), Some(&FieldValue::Float(0.5)));
    }

    #[test]
    fn missing_entity_is_ignored() {
        let (mut world, _) = world_with_grenade();
        assert_eq!(FieldReset::default().apply(&mut world, EntityId::new(99, 0)), 0);
    }
}
