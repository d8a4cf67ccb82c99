//! type loaders, keyed by [TypeId]
//!
//! The registry is open: any type gets populatable by registering a [TypeLoader] for it. The first
//! registration of a type wins, later ones are ignored with a warning.
use super::{populate_with, save_with, Asset, LoadContext, SaveContext, Schema};
use crate::value::{Literal, Value};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// Reads and writes one type from and to a [Value]
///
/// `None` means the value has the wrong shape. The caller records the issue and keeps the field's
/// default.
pub trait TypeLoader<F>: Send + Sync {
    fn load(&self, value: &Value, cx: &mut LoadContext<'_>) -> Option<F>;

    fn save(&self, value: &F, cx: &mut SaveContext<'_>) -> Option<Value>;
}

struct Entry {
    type_name: String,
    /// `Arc<dyn TypeLoader<F>>` for the key's type `F`
    loader: Box<dyn Any + Send + Sync>,
    /// `Arc<Schema<T>>` for assets
    schema: Option<Box<dyn Any + Send + Sync>>,
}

pub struct TypeRegistry {
    entries: HashMap<TypeId, Entry>,
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set()
            .entries(self.entries.values().map(|entry| &entry.type_name))
            .finish()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// Registry knowing the primitives
    ///
    /// `i32`, `i64`, `u32`, `u64`, `f32`, `f64`, `bool` and `String`.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register_primitive::<i32>(
            "i32",
            |l| l.as_i64()?.try_into().ok(),
            |v| Literal::Integer(*v as i64),
        );
        registry.register_primitive::<i64>("i64", Literal::as_i64, |v| Literal::Integer(*v));
        registry.register_primitive::<u32>(
            "u32",
            |l| l.as_i64()?.try_into().ok(),
            |v| Literal::Integer(*v as i64),
        );
        registry.register_primitive::<u64>(
            "u64",
            |l| l.as_i64()?.try_into().ok(),
            |v| match i64::try_from(*v) {
                Ok(v) => Literal::Integer(v),
                Err(_) => Literal::String(v.to_string()),
            },
        );
        registry.register_primitive::<f32>(
            "f32",
            |l| l.as_f64().map(|v| v as f32),
            |v| Literal::Decimal(*v as f64),
        );
        registry.register_primitive::<f64>("f64", Literal::as_f64, |v| Literal::Decimal(*v));
        registry.register_primitive::<bool>("bool", Literal::as_bool, |v| Literal::Boolean(*v));
        registry.register_primitive::<String>(
            "String",
            |l| match l {
                Literal::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            },
            |v| Literal::String(v.clone()),
        );
        registry
    }

    /// Registry without any loader
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Adds a loader for `F`
    ///
    /// Returns `false` if `F` already had one (the existing loader stays).
    pub fn register<F: 'static>(
        &mut self,
        type_name: impl Into<String>,
        loader: impl TypeLoader<F> + 'static,
    ) -> bool {
        let loader: Arc<dyn TypeLoader<F>> = Arc::new(loader);
        self.insert::<F>(type_name.into(), Box::new(loader), None)
    }

    /// Adds an [Asset] type, building its schema once
    pub fn register_asset<T: Asset>(&mut self) -> bool {
        let schema = Arc::new(T::schema());
        let loader: Arc<dyn TypeLoader<T>> = Arc::new(AssetLoader {
            schema: schema.clone(),
        });
        self.insert::<T>(
            schema.type_name().to_string(),
            Box::new(loader),
            Some(Box::new(schema)),
        )
    }

    /// Adds a bit-mask type, read and written as `"A | B"` (see [bitflags::parser])
    pub fn register_flags<B>(&mut self, type_name: impl Into<String>) -> bool
    where
        B: bitflags::Flags + Send + Sync + 'static,
        B::Bits: bitflags::parser::ParseHex + bitflags::parser::WriteHex,
    {
        self.register::<B>(type_name, FlagsLoader(PhantomData))
    }

    fn register_primitive<F: Send + Sync + 'static>(
        &mut self,
        type_name: &str,
        load: fn(&Literal) -> Option<F>,
        save: fn(&F) -> Literal,
    ) -> bool {
        self.register::<F>(type_name, PrimitiveLoader { load, save })
    }

    fn insert<F: 'static>(
        &mut self,
        type_name: String,
        loader: Box<dyn Any + Send + Sync>,
        schema: Option<Box<dyn Any + Send + Sync>>,
    ) -> bool {
        let id = TypeId::of::<F>();
        if let Some(existing) = self.entries.get(&id) {
            tracing::warn!(
                type_name = %type_name,
                existing = %existing.type_name,
                "type already registered, keeping the first loader"
            );
            return false;
        }
        tracing::trace!(type_name = %type_name, "type registered");
        self.entries.insert(
            id,
            Entry {
                type_name,
                loader,
                schema,
            },
        );
        true
    }

    pub fn loader<F: 'static>(&self) -> Option<Arc<dyn TypeLoader<F>>> {
        self.entries
            .get(&TypeId::of::<F>())?
            .loader
            .downcast_ref::<Arc<dyn TypeLoader<F>>>()
            .cloned()
    }

    /// Cached schema of a registered asset type
    pub fn schema<T: Asset>(&self) -> Option<Arc<Schema<T>>> {
        self.entries
            .get(&TypeId::of::<T>())?
            .schema
            .as_ref()?
            .downcast_ref::<Arc<Schema<T>>>()
            .cloned()
    }

    /// Name under which `F` was registered
    pub fn type_name<F: 'static>(&self) -> Option<&str> {
        self.entries
            .get(&TypeId::of::<F>())
            .map(|entry| entry.type_name.as_str())
    }

    pub fn contains_name(&self, type_name: &str) -> bool {
        self.entries
            .values()
            .any(|entry| entry.type_name == type_name)
    }
}

struct PrimitiveLoader<F> {
    load: fn(&Literal) -> Option<F>,
    save: fn(&F) -> Literal,
}

impl<F: Send + Sync> TypeLoader<F> for PrimitiveLoader<F> {
    fn load(&self, value: &Value, _cx: &mut LoadContext<'_>) -> Option<F> {
        (self.load)(value.as_literal()?)
    }

    fn save(&self, value: &F, _cx: &mut SaveContext<'_>) -> Option<Value> {
        Some((self.save)(value).into())
    }
}

struct AssetLoader<T> {
    schema: Arc<Schema<T>>,
}

impl<T: Asset> TypeLoader<T> for AssetLoader<T> {
    fn load(&self, value: &Value, cx: &mut LoadContext<'_>) -> Option<T> {
        if !value.is_object() {
            return None;
        }
        let mut target = T::default();
        populate_with(&self.schema, &mut target, value, cx);
        Some(target)
    }

    fn save(&self, value: &T, cx: &mut SaveContext<'_>) -> Option<Value> {
        Some(save_with(&self.schema, value, cx))
    }
}

struct FlagsLoader<B>(PhantomData<fn() -> B>);

impl<B> TypeLoader<B> for FlagsLoader<B>
where
    B: bitflags::Flags + Send + Sync + 'static,
    B::Bits: bitflags::parser::ParseHex + bitflags::parser::WriteHex,
{
    fn load(&self, value: &Value, _cx: &mut LoadContext<'_>) -> Option<B> {
        bitflags::parser::from_str::<B>(value.as_str()?).ok()
    }

    fn save(&self, value: &B, _cx: &mut SaveContext<'_>) -> Option<Value> {
        let mut text = String::new();
        bitflags::parser::to_writer(value, &mut text).ok()?;
        Some(text.into())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Doubling;

    impl TypeLoader<i32> for Doubling {
        fn load(&self, value: &Value, _cx: &mut LoadContext<'_>) -> Option<i32> {
            Some(value.as_literal()?.as_i64()? as i32 * 2)
        }

        fn save(&self, value: &i32, _cx: &mut SaveContext<'_>) -> Option<Value> {
            Some(Value::from(i64::from(*value / 2)))
        }
    }

    #[test]
    fn first_registration_wins() {
        let mut registry = TypeRegistry::new();
        assert!(!registry.register::<i32>("doubled", Doubling));
        assert_eq!(registry.type_name::<i32>(), Some("i32"));

        let mut registry = TypeRegistry::empty();
        assert!(registry.register::<i32>("doubled", Doubling));
        assert!(registry.contains_name("doubled"));
        assert!(registry.loader::<i64>().is_none());
    }

    #[test]
    fn primitive_conversions() {
        let registry = TypeRegistry::new();
        let root = Value::empty_object();
        let mut cx = LoadContext::new(&registry, &root);

        let u32s = registry.loader::<u32>().unwrap();
        assert_eq!(u32s.load(&Value::from(7i64), &mut cx), Some(7));
        assert_eq!(u32s.load(&Value::from(-7i64), &mut cx), None);
        assert_eq!(u32s.load(&Value::from("12"), &mut cx), Some(12));

        let f32s = registry.loader::<f32>().unwrap();
        assert_eq!(f32s.load(&Value::from(2i64), &mut cx), Some(2.0));

        let strings = registry.loader::<String>().unwrap();
        assert_eq!(strings.load(&Value::from(true), &mut cx).as_deref(), Some("true"));
        assert_eq!(strings.load(&Value::empty_object(), &mut cx), None);
    }
}
