//! populate typed objects from documents
//!
//! A type opts in by implementing [Asset], which declares a [Schema]: the list of populated
//! members, each with accessor functions. Population walks that table:
//! - the member name is looked up case-sensitively, then case-insensitively
//! - absent members keep their default (documents may be partial)
//! - values are converted by the [TypeRegistry] entry for the member's type
//! - lists read all integer keys in ascending order
//! - references are `relativePath:TypeName` strings ([NodeRef])
//!
//! Nothing here fails hard. Every problem becomes a [PopulateIssue], is logged, and leaves the
//! member at its default while the rest of the object is populated.
//!
//! ```
//! use assetry::populate::{self, Asset, Schema, TypeRegistry};
//!
//! #[derive(Default)]
//! struct Unit {
//!     hp: i32,
//!     speed: f64,
//! }
//!
//! impl Asset for Unit {
//!     fn schema() -> Schema<Self> {
//!         Schema::<Self>::new("Unit")
//!             .field("hp", |u| &u.hp, |u| &mut u.hp)
//!             .field("speed", |u| &u.speed, |u| &mut u.speed)
//!     }
//! }
//!
//! let registry = TypeRegistry::new();
//! let (unit, issues) = populate::load::<Unit>(&assetry::document!("hp = 80"), &registry);
//! assert_eq!(unit.hp, 80);
//! assert_eq!(unit.speed, 0.0);
//! assert!(issues.is_empty());
//! ```
mod reference;
mod registry;

pub use reference::{NodeRef, ReferenceError};
pub use registry::{TypeLoader, TypeRegistry};

use crate::value::{Location, Object, Value};
use std::sync::Arc;

/// A type that can be populated from a document
pub trait Asset: Default + Send + Sync + 'static {
    fn schema() -> Schema<Self>;
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PopulateIssue {
    #[error("{field}: no loader registered for {type_name}")]
    UnknownType {
        field: String,
        type_name: &'static str,
    },
    #[error("{field}: value at {location} is not a valid {type_name}")]
    Mismatch {
        field: String,
        type_name: &'static str,
        location: Location,
    },
    #[error("{field}: key {key:?} is not a list index, skipped")]
    NotAnIndex { field: String, key: String },
    #[error("{field}: {error}")]
    Reference {
        field: String,
        error: ReferenceError,
    },
}

/// Populated members of `T`
pub struct Schema<T> {
    type_name: String,
    members: Vec<Box<dyn Member<T>>>,
}

impl<T> std::fmt::Debug for Schema<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("type_name", &self.type_name)
            .field(
                "members",
                &self
                    .members
                    .iter()
                    .map(|member| member.name().unwrap_or("<inherited>"))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<T: 'static> Schema<T> {
    /// `type_name` is the name used in references and logs
    ///
    /// Spell out the target (`Schema::<Self>::new`), the accessor closures are typed from it.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            members: vec![],
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// A member converted by the registry entry of `F`
    pub fn field<F: 'static>(
        mut self,
        name: impl Into<String>,
        get: fn(&T) -> &F,
        get_mut: fn(&mut T) -> &mut F,
    ) -> Self {
        self.members.push(Box::new(FieldMember {
            name: name.into(),
            get,
            get_mut,
        }));
        self
    }

    /// A list member, elements converted by the registry entry of `E`
    pub fn list<E: 'static>(
        mut self,
        name: impl Into<String>,
        get: fn(&T) -> &Vec<E>,
        get_mut: fn(&mut T) -> &mut Vec<E>,
    ) -> Self {
        self.members.push(Box::new(ListMember {
            name: name.into(),
            get,
            get_mut,
        }));
        self
    }

    /// A typed reference to another object of the same document
    pub fn reference(
        mut self,
        name: impl Into<String>,
        get: fn(&T) -> &Option<NodeRef>,
        get_mut: fn(&mut T) -> &mut Option<NodeRef>,
    ) -> Self {
        self.members.push(Box::new(ReferenceMember {
            name: name.into(),
            get,
            get_mut,
        }));
        self
    }

    /// Members of an embedded parent type, read from the same object
    pub fn inherit<P: Asset>(mut self, get: fn(&T) -> &P, get_mut: fn(&mut T) -> &mut P) -> Self {
        self.members.push(Box::new(InheritMember { get, get_mut }));
        self
    }
}

/// State of one population run
pub struct LoadContext<'a> {
    registry: &'a TypeRegistry,
    root: &'a Value,
    path: Vec<String>,
    issues: Vec<PopulateIssue>,
}

impl<'a> LoadContext<'a> {
    pub fn new(registry: &'a TypeRegistry, root: &'a Value) -> Self {
        Self {
            registry,
            root,
            path: vec![],
            issues: vec![],
        }
    }

    pub fn registry(&self) -> &'a TypeRegistry {
        self.registry
    }

    /// Document the population started from
    pub fn root(&self) -> &'a Value {
        self.root
    }

    /// Keys from the root to the value being loaded
    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn issues(&self) -> &[PopulateIssue] {
        &self.issues
    }

    pub fn into_issues(self) -> Vec<PopulateIssue> {
        self.issues
    }

    pub fn log(&mut self, issue: PopulateIssue) {
        tracing::warn!(%issue, "populate issue");
        self.issues.push(issue);
    }

    /// Converts `value` with the registry entry of `F`, logging unknown types and mismatches
    pub fn load_value<F: 'static>(&mut self, value: &Value) -> Option<F> {
        let Some(loader) = self.registry.loader::<F>() else {
            self.log(PopulateIssue::UnknownType {
                field: field_name(&self.path),
                type_name: std::any::type_name::<F>(),
            });
            return None;
        };
        let loaded = loader.load(value, self);
        if loaded.is_none() {
            self.log(PopulateIssue::Mismatch {
                field: field_name(&self.path),
                type_name: std::any::type_name::<F>(),
                location: value.location().clone(),
            });
        }
        loaded
    }

    fn nested<R>(&mut self, key: &str, f: impl FnOnce(&mut Self) -> R) -> R {
        self.path.push(key.to_string());
        let result = f(self);
        self.path.pop();
        result
    }
}

/// State of one save run
pub struct SaveContext<'a> {
    registry: &'a TypeRegistry,
    path: Vec<String>,
    issues: Vec<PopulateIssue>,
}

impl<'a> SaveContext<'a> {
    pub fn new(registry: &'a TypeRegistry) -> Self {
        Self {
            registry,
            path: vec![],
            issues: vec![],
        }
    }

    pub fn registry(&self) -> &'a TypeRegistry {
        self.registry
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn into_issues(self) -> Vec<PopulateIssue> {
        self.issues
    }

    pub fn log(&mut self, issue: PopulateIssue) {
        tracing::warn!(%issue, "save issue");
        self.issues.push(issue);
    }

    pub fn save_value<F: 'static>(&mut self, value: &F) -> Option<Value> {
        let Some(loader) = self.registry.loader::<F>() else {
            self.log(PopulateIssue::UnknownType {
                field: field_name(&self.path),
                type_name: std::any::type_name::<F>(),
            });
            return None;
        };
        loader.save(value, self)
    }

    fn nested<R>(&mut self, key: &str, f: impl FnOnce(&mut Self) -> R) -> R {
        self.path.push(key.to_string());
        let result = f(self);
        self.path.pop();
        result
    }
}

/// Populates `target` from `document`, returns all issues found
pub fn populate<T: Asset>(
    target: &mut T,
    document: &Value,
    registry: &TypeRegistry,
) -> Vec<PopulateIssue> {
    let schema = schema_of::<T>(registry);
    let mut cx = LoadContext::new(registry, document);
    if !document.is_object() {
        cx.log(PopulateIssue::Mismatch {
            field: field_name(&[]),
            type_name: std::any::type_name::<T>(),
            location: document.location().clone(),
        });
    } else {
        populate_with(&schema, target, document, &mut cx);
    }
    cx.into_issues()
}

/// A new `T` populated from `document`
pub fn load<T: Asset>(document: &Value, registry: &TypeRegistry) -> (T, Vec<PopulateIssue>) {
    let mut target = T::default();
    let issues = populate(&mut target, document, registry);
    (target, issues)
}

/// Writes `source` back into a document
pub fn save<T: Asset>(source: &T, registry: &TypeRegistry) -> (Value, Vec<PopulateIssue>) {
    let schema = schema_of::<T>(registry);
    let mut cx = SaveContext::new(registry);
    let document = save_with(&schema, source, &mut cx);
    (document, cx.into_issues())
}

fn schema_of<T: Asset>(registry: &TypeRegistry) -> Arc<Schema<T>> {
    registry
        .schema::<T>()
        .unwrap_or_else(|| Arc::new(T::schema()))
}

pub(crate) fn populate_with<T>(
    schema: &Schema<T>,
    target: &mut T,
    document: &Value,
    cx: &mut LoadContext<'_>,
) {
    for member in &schema.members {
        match member.name() {
            Some(name) => {
                if let Some(value) = document.get_ignore_case(name) {
                    member.load(target, value, cx);
                }
            }
            None => member.load(target, document, cx),
        }
    }
}

pub(crate) fn save_with<T>(schema: &Schema<T>, source: &T, cx: &mut SaveContext<'_>) -> Value {
    let mut object = Object::new();
    for member in &schema.members {
        member.save(source, &mut object, cx);
    }
    Value::Object(object, Location::generated())
}

fn field_name(path: &[String]) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    path.join("/")
}

trait Member<T>: Send + Sync {
    /// `None` for members that read the whole object
    fn name(&self) -> Option<&str>;

    fn load(&self, target: &mut T, value: &Value, cx: &mut LoadContext<'_>);

    fn save(&self, source: &T, object: &mut Object, cx: &mut SaveContext<'_>);
}

struct FieldMember<T, F> {
    name: String,
    get: fn(&T) -> &F,
    get_mut: fn(&mut T) -> &mut F,
}

impl<T: 'static, F: 'static> Member<T> for FieldMember<T, F> {
    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn load(&self, target: &mut T, value: &Value, cx: &mut LoadContext<'_>) {
        if let Some(loaded) = cx.nested(&self.name, |cx| cx.load_value::<F>(value)) {
            *(self.get_mut)(target) = loaded;
        }
    }

    fn save(&self, source: &T, object: &mut Object, cx: &mut SaveContext<'_>) {
        if let Some(saved) = cx.nested(&self.name, |cx| cx.save_value::<F>((self.get)(source))) {
            object.insert(self.name.clone(), saved);
        }
    }
}

struct ListMember<T, E> {
    name: String,
    get: fn(&T) -> &Vec<E>,
    get_mut: fn(&mut T) -> &mut Vec<E>,
}

impl<T: 'static, E: 'static> Member<T> for ListMember<T, E> {
    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn load(&self, target: &mut T, value: &Value, cx: &mut LoadContext<'_>) {
        let elements = cx.nested(&self.name, |cx| {
            let (indexed, rejected) = value.index_entries();
            for key in rejected {
                cx.log(PopulateIssue::NotAnIndex {
                    field: field_name(cx.path()),
                    key: key.to_string(),
                });
            }
            indexed
                .into_iter()
                .filter_map(|(index, element)| {
                    cx.nested(&index.to_string(), |cx| cx.load_value::<E>(element))
                })
                .collect::<Vec<_>>()
        });
        (self.get_mut)(target).extend(elements);
    }

    fn save(&self, source: &T, object: &mut Object, cx: &mut SaveContext<'_>) {
        let elements = cx.nested(&self.name, |cx| {
            (self.get)(source)
                .iter()
                .enumerate()
                .filter_map(|(index, element)| {
                    cx.nested(&index.to_string(), |cx| cx.save_value::<E>(element))
                })
                .enumerate()
                .map(|(index, value)| (index.to_string(), value))
                .collect::<Vec<_>>()
        });
        object.insert(self.name.clone(), Value::object(elements));
    }
}

struct ReferenceMember<T> {
    name: String,
    get: fn(&T) -> &Option<NodeRef>,
    get_mut: fn(&mut T) -> &mut Option<NodeRef>,
}

impl<T> ReferenceMember<T> {
    fn resolve(&self, value: &Value, cx: &LoadContext<'_>) -> Result<NodeRef, ReferenceError> {
        let encoded = value
            .as_str()
            .ok_or_else(|| ReferenceError::MissingType(value_text(value)))?;
        let reference = NodeRef::parse(encoded, cx.path())?;
        if reference.target(cx.root()).is_none() {
            return Err(ReferenceError::NotFound(encoded.to_string()));
        }
        if !cx.registry().contains_name(&reference.type_name) {
            return Err(ReferenceError::UnknownType {
                reference: encoded.to_string(),
                type_name: reference.type_name,
            });
        }
        Ok(reference)
    }
}

impl<T: 'static> Member<T> for ReferenceMember<T> {
    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn load(&self, target: &mut T, value: &Value, cx: &mut LoadContext<'_>) {
        match self.resolve(value, cx) {
            Ok(reference) => *(self.get_mut)(target) = Some(reference),
            Err(error) => {
                let field = cx.nested(&self.name, |cx| field_name(cx.path()));
                cx.log(PopulateIssue::Reference { field, error });
            }
        }
    }

    fn save(&self, source: &T, object: &mut Object, cx: &mut SaveContext<'_>) {
        if let Some(reference) = (self.get)(source) {
            object.insert(self.name.clone(), reference.encode(cx.path()).into());
        }
    }
}

struct InheritMember<T, P> {
    get: fn(&T) -> &P,
    get_mut: fn(&mut T) -> &mut P,
}

impl<T: 'static, P: Asset> Member<T> for InheritMember<T, P> {
    fn name(&self) -> Option<&str> {
        None
    }

    fn load(&self, target: &mut T, value: &Value, cx: &mut LoadContext<'_>) {
        let schema = schema_of::<P>(cx.registry());
        populate_with(&schema, (self.get_mut)(target), value, cx);
    }

    fn save(&self, source: &T, object: &mut Object, cx: &mut SaveContext<'_>) {
        let schema = schema_of::<P>(cx.registry());
        if let Value::Object(parent, _) = save_with(&schema, (self.get)(source), cx) {
            object.extend(parent);
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Literal(literal, _) => literal.to_string(),
        Value::Object(..) => "{...}".to_string(),
    }
}
