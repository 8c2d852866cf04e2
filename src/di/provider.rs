use crate::di::{Injectable, Injector, Key};
use crate::error::Result;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A resolved value as stored in a container.
pub type Instance = Arc<dyn Any + Send + Sync>;

type BuildFn = fn(&Injector, &Class) -> Result<Instance>;

/// Erased descriptor table of an [`Injectable`] type.
///
/// Carries everything the injector needs to build the type without knowing it
/// statically: declared sub-providers, ordered constructor keys, property keys
/// and the monomorphized builder.
#[derive(Clone)]
pub struct Class {
    name: &'static str,
    providers: fn() -> Vec<Provider>,
    inject_keys: fn() -> Vec<Key>,
    property_keys: fn() -> Vec<PropertyKey>,
    build: BuildFn,
}

impl Class {
    pub fn of<T: Injectable>() -> Self {
        Self {
            name: std::any::type_name::<T>(),
            providers: T::providers,
            inject_keys: T::inject_keys,
            property_keys: T::property_keys,
            build: Injector::instantiate::<T>,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn providers(&self) -> Vec<Provider> {
        (self.providers)()
    }

    pub fn inject_keys(&self) -> Vec<Key> {
        (self.inject_keys)()
    }

    pub fn property_keys(&self) -> Vec<PropertyKey> {
        (self.property_keys)()
    }

    pub(crate) fn build(&self, injector: &Injector) -> Result<Instance> {
        (self.build)(injector, self)
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class").field("name", &self.name).finish()
    }
}

/// A property-injection entry: field name, key to resolve, mutability.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropertyKey {
    name: &'static str,
    key: Key,
    mutable: bool,
}

impl PropertyKey {
    pub fn new(name: &'static str, key: Key, mutable: bool) -> Self {
        Self { name, key, mutable }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn is_mutable(&self) -> bool {
        self.mutable
    }
}

/// Provider descriptor: binds `provide` to either a class recipe or a value.
///
/// # Example
/// ```ignore
/// let providers = vec![
///     Provider::class::<UserService>(),
///     Provider::value(Key::token("is_forwarded"), false),
///     Provider::new(Key::token("repository")).use_class::<PgRepository>(),
/// ];
/// ```
#[derive(Clone)]
pub struct Provider {
    pub provide: Key,
    pub use_class: Option<Class>,
    pub use_value: Option<Instance>,
}

impl Provider {
    /// An empty descriptor for `provide`. Invalid until a recipe is attached.
    pub fn new(provide: Key) -> Self {
        Self {
            provide,
            use_class: None,
            use_value: None,
        }
    }

    /// `T` bound under its own type key.
    pub fn class<T: Injectable>() -> Self {
        Self::new(Key::of::<T>()).use_class::<T>()
    }

    /// A literal value bound under `provide`.
    pub fn value<T: Send + Sync + 'static>(provide: Key, value: T) -> Self {
        Self::instance(provide, Arc::new(value))
    }

    /// An already shared value bound under `provide`.
    pub fn instance<T: Send + Sync + 'static>(provide: Key, value: Arc<T>) -> Self {
        Self {
            provide,
            use_class: None,
            use_value: Some(value as Instance),
        }
    }

    /// A trait object bound under `Key::of::<T>()`, readable with `get_trait`.
    pub fn shared<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self::value(Key::of::<T>(), value)
    }

    pub fn use_class<T: Injectable>(mut self) -> Self {
        self.use_class = Some(Class::of::<T>());
        self
    }

    pub fn use_value<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.use_value = Some(Arc::new(value) as Instance);
        self
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("provide", &self.provide)
            .field("use_class", &self.use_class)
            .field("use_value", &self.use_value.is_some())
            .finish()
    }
}
