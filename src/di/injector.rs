use crate::di::metadata::{
    constructor_inject_keys, constructor_prototype_keys, constructor_providers, merge_providers,
    verify_provider, verify_providers,
};
use crate::di::{Arguments, Class, Injectable, Instance, Key, Provider};
use crate::error::{Result, StrataError};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use uuid::Uuid;

/// Hierarchical dependency injection container.
///
/// Every injector owns a key → instance map, may have a parent it falls back
/// to, and keeps the children created from it. Lookups are local first, then
/// up the parent chain, so a child's binding shadows its ancestors'.
///
/// Injectors are never torn down implicitly: a scope holds a binding to itself
/// and strong links to its parent and children until [`Injector::destroy`] is
/// called.
///
/// # Example
/// ```ignore
/// let root = Injector::create_and_resolve(Provider::class::<Database>(), vec![])?;
/// let scope = Injector::create_and_resolve_child(
///     &root,
///     Provider::class::<UserService>(),
///     vec![Provider::value(Key::token("tenant"), "acme".to_string())],
/// )?;
/// let service = scope.resolve::<UserService>()?;
/// scope.destroy();
/// ```
pub struct Injector {
    id: String,
    providers: DashMap<Key, Instance>,
    parent: RwLock<Option<Arc<Injector>>>,
    children: Mutex<Vec<Arc<Injector>>>,
    destroyed: AtomicBool,
}

impl Injector {
    fn new(parent: Option<Arc<Injector>>) -> Arc<Self> {
        let injector = Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            providers: DashMap::new(),
            parent: RwLock::new(parent),
            children: Mutex::new(Vec::new()),
            destroyed: AtomicBool::new(false),
        });
        // Bound up front so the instances built in this scope can inject it.
        injector
            .providers
            .insert(Key::of::<Injector>(), Arc::clone(&injector) as Instance);
        tracing::trace!(injector = %injector.id, "Injector created");
        injector
    }

    /// Build a standalone injector and resolve `provider`'s graph inside it.
    pub fn create_and_resolve(provider: Provider, providers: Vec<Provider>) -> Result<Arc<Self>> {
        let injector = Self::new(None);
        if let Err(e) = injector.resolve_root(provider, providers) {
            injector.destroy();
            return Err(e);
        }
        Ok(injector)
    }

    /// Build a child of `parent`, resolve `provider` inside it and attach it.
    ///
    /// # Errors
    /// Fails with [`StrataError::Destroyed`] when `parent` was destroyed, or
    /// with the first configuration error met while resolving.
    pub fn create_and_resolve_child(
        parent: &Arc<Injector>,
        provider: Provider,
        providers: Vec<Provider>,
    ) -> Result<Arc<Self>> {
        parent.ensure_live()?;
        let child = Self::new(Some(Arc::clone(parent)));
        if let Err(e) = child.resolve_root(provider, providers) {
            child.destroy();
            return Err(e);
        }
        {
            // Checked under the lock `destroy` takes the children with.
            let mut children = parent.children.lock().unwrap_or_else(PoisonError::into_inner);
            if parent.is_destroyed() {
                drop(children);
                child.destroy();
                return Err(StrataError::Destroyed {
                    injector: parent.id.clone(),
                });
            }
            children.push(Arc::clone(&child));
        }
        tracing::debug!(parent = %parent.id, child = %child.id, "Child injector attached");
        Ok(child)
    }

    fn resolve_root(&self, provider: Provider, providers: Vec<Provider>) -> Result<Instance> {
        self.resolve_provider(verify_provider(provider)?, verify_providers(providers)?)
    }

    fn resolve_provider(&self, provider: Provider, overrides: Vec<Provider>) -> Result<Instance> {
        let declared = verify_providers(constructor_providers(&provider))?;
        for item in merge_providers(declared, overrides) {
            self.resolve_provider(item, Vec::new())?;
        }

        if let Some(value) = provider.use_value {
            self.set(provider.provide, Arc::clone(&value))?;
            return Ok(value);
        }

        let class = provider
            .use_class
            .as_ref()
            .ok_or_else(|| StrataError::InvalidProvider {
                key: provider.provide.to_string(),
            })?;
        let instance = class.build(self)?;
        self.set(provider.provide.clone(), Arc::clone(&instance))?;
        tracing::trace!(
            injector = %self.id,
            key = %provider.provide,
            class = class.name(),
            "Provider resolved"
        );
        Ok(instance)
    }

    /// Construct `T` from its descriptor table: constructor keys, then
    /// property keys, then the post-construction hook.
    pub(crate) fn instantiate<T: Injectable>(&self, class: &Class) -> Result<Instance> {
        let provider = Provider::new(Key::of::<T>()).use_class::<T>();

        let arguments = constructor_inject_keys(&provider)
            .into_iter()
            .map(|key| {
                let value = self.get(&key, Some(class.name()))?;
                Ok((key, value))
            })
            .collect::<Result<Vec<_>>>()?;
        let mut instance = T::construct(Arguments::new(class.name(), arguments))?;

        for property in constructor_prototype_keys(&provider) {
            let value = self.get(property.key(), Some(class.name()))?;
            instance.inject_property(&property, value)?;
            tracing::trace!(
                class = class.name(),
                property = property.name(),
                mutable = property.is_mutable(),
                "Property injected"
            );
        }

        instance.after_construct();
        Ok(Arc::new(instance))
    }

    /// Resolve `key` locally, then through the parent chain.
    ///
    /// `requested_by` names the class asking for the key and only feeds the
    /// error message.
    pub fn get(&self, key: &Key, requested_by: Option<&str>) -> Result<Instance> {
        self.ensure_live()?;
        if let Some(entry) = self.providers.get(key) {
            return Ok(Arc::clone(entry.value()));
        }

        let parent = self
            .parent
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match parent {
            Some(parent) => parent.get(key, requested_by),
            None => Err(StrataError::NoProvider {
                key: key.to_string(),
                requested_by: requested_by.map(str::to_string),
                injector: self.id.clone(),
            }),
        }
    }

    pub fn get_as<T: Send + Sync + 'static>(&self, key: &Key) -> Result<Arc<T>> {
        self.get(key, None)?
            .downcast::<T>()
            .map_err(|_| StrataError::DowncastFailed {
                key: key.to_string(),
                expected: std::any::type_name::<T>().to_string(),
            })
    }

    /// Read a trait object bound with [`Provider::shared`].
    pub fn get_trait<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let wrapper = self.get_as::<Arc<T>>(&Key::of::<T>())?;
        Ok(wrapper.as_ref().clone())
    }

    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.get_as::<T>(&Key::of::<T>())
    }

    /// Local-only membership check.
    pub fn has(&self, key: &Key) -> bool {
        self.providers.contains_key(key)
    }

    /// (Re)bind `key` in this injector.
    pub fn set(&self, key: Key, value: Instance) -> Result<()> {
        self.ensure_live()?;
        self.providers.insert(key, value);
        Ok(())
    }

    /// Destroy children depth-first, detach from the parent and drop every
    /// local binding. Safe to call more than once.
    pub fn destroy(&self) {
        let first = !self.destroyed.swap(true, Ordering::SeqCst);

        let children = std::mem::take(
            &mut *self.children.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for child in children {
            child.destroy();
        }

        let parent = self
            .parent
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(parent) = parent {
            parent.detach(&self.id);
        }

        self.providers.clear();
        if first {
            tracing::debug!(injector = %self.id, "Injector destroyed");
        }
    }

    fn detach(&self, child_id: &str) {
        self.children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|child| child.id != child_id);
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(StrataError::Destroyed {
                injector: self.id.clone(),
            });
        }
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn parent(&self) -> Option<Arc<Injector>> {
        self.parent
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn children(&self) -> usize {
        self.children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl std::fmt::Debug for Injector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Injector")
            .field("id", &self.id)
            .field("bindings", &self.providers.len())
            .field("children", &self.children())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::di::{MutableProperty, Property, PropertyKey};
    use std::sync::atomic::AtomicUsize;

    struct Database {
        url: String,
    }

    impl Injectable for Database {
        fn inject_keys() -> Vec<Key> {
            vec![Key::token("database_url")]
        }

        fn construct(mut args: Arguments) -> Result<Self> {
            Ok(Self {
                url: args.next_value::<String>()?,
            })
        }
    }

    struct UserService {
        database: Arc<Database>,
        tenant: Property<String>,
        region: MutableProperty<String>,
        hook_calls: usize,
        injected_before_hook: bool,
    }

    impl Injectable for UserService {
        fn providers() -> Vec<Provider> {
            vec![
                Provider::value(Key::token("database_url"), "postgres://declared".to_string()),
                Provider::class::<Database>(),
            ]
        }

        fn inject_keys() -> Vec<Key> {
            vec![Key::of::<Database>()]
        }

        fn property_keys() -> Vec<PropertyKey> {
            vec![
                PropertyKey::new("tenant", Key::token("tenant"), false),
                PropertyKey::new("region", Key::token("region"), true),
            ]
        }

        fn construct(mut args: Arguments) -> Result<Self> {
            Ok(Self {
                database: args.next::<Database>()?,
                tenant: Property::default(),
                region: MutableProperty::default(),
                hook_calls: 0,
                injected_before_hook: false,
            })
        }

        fn inject_property(&mut self, property: &PropertyKey, value: Instance) -> Result<()> {
            match property.name() {
                "tenant" => self.tenant.inject(property.key(), value),
                "region" => self.region.inject(property.key(), value),
                other => Err(StrataError::UnknownProperty {
                    class: "UserService".to_string(),
                    property: other.to_string(),
                }),
            }
        }

        fn after_construct(&mut self) {
            self.hook_calls += 1;
            self.injected_before_hook = self.tenant.is_set() && self.region.is_set();
        }
    }

    fn tenant_providers() -> Vec<Provider> {
        vec![
            Provider::value(Key::token("tenant"), "acme".to_string()),
            Provider::value(Key::token("region"), "eu".to_string()),
        ]
    }

    #[test]
    fn test_resolves_declared_providers() {
        let injector =
            Injector::create_and_resolve(Provider::class::<UserService>(), tenant_providers())
                .unwrap();

        let service = injector.resolve::<UserService>().unwrap();
        assert_eq!(service.database.url, "postgres://declared");
        assert_eq!(service.tenant.as_str(), "acme");
        assert_eq!(service.region.value_or(String::new()), "eu");
        injector.destroy();
    }

    #[test]
    fn test_caller_override_replaces_declared_provider() {
        let mut providers = tenant_providers();
        providers.push(Provider::value(
            Key::of::<Database>(),
            Database {
                url: "postgres://override".to_string(),
            },
        ));
        let injector =
            Injector::create_and_resolve(Provider::class::<UserService>(), providers).unwrap();

        let service = injector.resolve::<UserService>().unwrap();
        assert_eq!(service.database.url, "postgres://override");
        injector.destroy();
    }

    #[test]
    fn test_post_construct_runs_once_after_injection() {
        let injector =
            Injector::create_and_resolve(Provider::class::<UserService>(), tenant_providers())
                .unwrap();
        let service = injector.resolve::<UserService>().unwrap();
        assert_eq!(service.hook_calls, 1);
        assert!(service.injected_before_hook);
        injector.destroy();
    }

    #[test]
    fn test_mutable_property_survives_sharing() {
        let injector =
            Injector::create_and_resolve(Provider::class::<UserService>(), tenant_providers())
                .unwrap();
        let service = injector.resolve::<UserService>().unwrap();
        service.region.set("us".to_string());
        assert_eq!(service.region.value_or(String::new()), "us");
        injector.destroy();
    }

    #[test]
    fn test_missing_dependency_fails_fast() {
        let err = Injector::create_and_resolve(Provider::class::<UserService>(), vec![])
            .unwrap_err();
        match err {
            StrataError::NoProvider {
                key, requested_by, ..
            } => {
                assert_eq!(key, "\"tenant\"");
                assert!(requested_by.unwrap().ends_with("UserService"));
            }
            other => panic!("expected NoProvider, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_descriptor_is_rejected() {
        let err = Injector::create_and_resolve(
            Provider::class::<Database>(),
            vec![Provider::new(Key::token("database_url"))],
        )
        .unwrap_err();
        assert!(matches!(err, StrataError::InvalidProvider { .. }));
    }

    #[test]
    fn test_child_shadows_parent() {
        let root = Injector::create_and_resolve(
            Provider::value(Key::token("greeting"), "parent".to_string()),
            vec![],
        )
        .unwrap();
        let child = Injector::create_and_resolve_child(
            &root,
            Provider::value(Key::token("greeting"), "child".to_string()),
            vec![],
        )
        .unwrap();

        let key = Key::token("greeting");
        assert_eq!(*child.get_as::<String>(&key).unwrap(), "child");
        assert!(child.has(&key));

        child.destroy();
        assert_eq!(*root.get_as::<String>(&key).unwrap(), "parent");
        assert_eq!(root.children(), 0);
        root.destroy();
    }

    #[test]
    fn test_child_falls_back_to_parent() {
        let root = Injector::create_and_resolve(
            Provider::value(Key::token("database_url"), "postgres://root".to_string()),
            vec![],
        )
        .unwrap();
        let child =
            Injector::create_and_resolve_child(&root, Provider::class::<Database>(), vec![])
                .unwrap();

        assert!(!child.has(&Key::token("database_url")));
        assert_eq!(child.resolve::<Database>().unwrap().url, "postgres://root");
        assert!(!root.has(&Key::of::<Database>()));
        root.destroy();
    }

    #[test]
    fn test_scope_binds_itself() {
        let root = Injector::create_and_resolve(
            Provider::value(Key::token("unused"), ()),
            vec![],
        )
        .unwrap();
        let child =
            Injector::create_and_resolve_child(&root, Provider::value(Key::token("x"), 1u8), vec![])
                .unwrap();

        let own = child.resolve::<Injector>().unwrap();
        assert_eq!(own.id(), child.id());
        assert_eq!(child.parent().unwrap().id(), root.id());
        root.destroy();
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let root =
            Injector::create_and_resolve(Provider::value(Key::token("x"), 1u8), vec![]).unwrap();
        let _child =
            Injector::create_and_resolve_child(&root, Provider::value(Key::token("y"), 2u8), vec![])
                .unwrap();

        root.destroy();
        root.destroy();
        assert!(root.is_destroyed());
        assert_eq!(root.children(), 0);
    }

    #[test]
    fn test_destroy_cascades_to_children() {
        let root =
            Injector::create_and_resolve(Provider::value(Key::token("x"), 1u8), vec![]).unwrap();
        let children: Vec<_> = (0..3u8)
            .map(|i| {
                Injector::create_and_resolve_child(
                    &root,
                    Provider::value(Key::token("n"), i),
                    vec![],
                )
                .unwrap()
            })
            .collect();
        let grandchild = Injector::create_and_resolve_child(
            &children[0],
            Provider::value(Key::token("n"), 9u8),
            vec![],
        )
        .unwrap();
        assert_eq!(root.children(), 3);

        root.destroy();
        assert!(children.iter().all(|c| c.is_destroyed()));
        assert!(grandchild.is_destroyed());
    }

    #[test]
    fn test_access_after_destroy_fails_loudly() {
        let root =
            Injector::create_and_resolve(Provider::value(Key::token("x"), 1u8), vec![]).unwrap();
        root.destroy();

        assert!(matches!(
            root.get(&Key::token("x"), None),
            Err(StrataError::Destroyed { .. })
        ));
        assert!(matches!(
            Injector::create_and_resolve_child(&root, Provider::value(Key::token("y"), 1u8), vec![]),
            Err(StrataError::Destroyed { .. })
        ));
    }

    #[test]
    fn test_failed_child_is_not_attached() {
        let root =
            Injector::create_and_resolve(Provider::value(Key::token("x"), 1u8), vec![]).unwrap();
        let result =
            Injector::create_and_resolve_child(&root, Provider::class::<Database>(), vec![]);
        assert!(result.is_err());
        assert_eq!(root.children(), 0);
        root.destroy();
    }

    #[test]
    fn test_parent_destroyed_during_resolution_rejects_child() {
        struct ParentKiller;
        impl Injectable for ParentKiller {
            fn inject_keys() -> Vec<Key> {
                vec![Key::of::<Injector>()]
            }
            fn construct(mut args: Arguments) -> Result<Self> {
                let scope = args.next::<Injector>()?;
                if let Some(parent) = scope.parent() {
                    parent.destroy();
                }
                Ok(ParentKiller)
            }
        }

        let root =
            Injector::create_and_resolve(Provider::value(Key::token("x"), 1u8), vec![]).unwrap();
        let result =
            Injector::create_and_resolve_child(&root, Provider::class::<ParentKiller>(), vec![]);

        assert!(matches!(result, Err(StrataError::Destroyed { .. })));
        assert!(root.is_destroyed());
        assert_eq!(root.children(), 0);
    }

    #[test]
    fn test_trait_objects_resolve_through_shared() {
        trait Clock: Send + Sync {
            fn now(&self) -> u64;
        }
        struct FixedClock;
        impl Clock for FixedClock {
            fn now(&self) -> u64 {
                42
            }
        }

        let clock: Arc<dyn Clock> = Arc::new(FixedClock);
        let root = Injector::create_and_resolve(Provider::shared(clock), vec![]).unwrap();
        assert_eq!(root.get_trait::<dyn Clock>().unwrap().now(), 42);
        root.destroy();
    }

    #[test]
    fn test_declared_providers_resolve_before_target() {
        static BUILDS: AtomicUsize = AtomicUsize::new(0);

        struct Counter;
        impl Injectable for Counter {
            fn construct(_args: Arguments) -> Result<Self> {
                BUILDS.fetch_add(1, Ordering::SeqCst);
                Ok(Counter)
            }
        }

        struct Holder;
        impl Injectable for Holder {
            fn providers() -> Vec<Provider> {
                vec![Provider::class::<Counter>()]
            }
            fn construct(_args: Arguments) -> Result<Self> {
                Ok(Holder)
            }
        }

        let root = Injector::create_and_resolve(
            Provider::class::<Holder>(),
            vec![Provider::value(Key::token("unrelated"), 0u8)],
        )
        .unwrap();
        assert_eq!(BUILDS.load(Ordering::SeqCst), 1);
        assert!(root.has(&Key::of::<Counter>()));
        root.destroy();
    }
}
