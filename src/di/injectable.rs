use crate::di::{Instance, Key, PropertyKey, Provider};
use crate::error::{Result, StrataError};
use std::sync::Arc;

/// Descriptor table of a type the [`Injector`](crate::di::Injector) can build.
///
/// This trait is typically implemented via `#[derive(Injectable)]`; writing it
/// by hand is fine when the table needs to be spelled out explicitly.
///
/// Construction is two-phase: `construct` receives the resolved constructor
/// arguments in the order of `inject_keys`, then `inject_property` is called
/// once per entry of `property_keys` on the value before it is shared. Once
/// the value is wrapped in an `Arc` only interior-mutable properties
/// ([`MutableProperty`](crate::di::MutableProperty)) can change.
///
/// # Example
/// ```
/// use strata::Injectable;
/// use std::sync::Arc;
///
/// #[derive(Default)]
/// pub struct Database;
///
/// impl strata::Injectable for Database {
///     fn construct(_args: strata::Arguments) -> strata::Result<Self> {
///         Ok(Database)
///     }
/// }
///
/// #[derive(Injectable)]
/// pub struct UserService {
///     #[inject]
///     database: Arc<Database>,
/// }
/// ```
pub trait Injectable: Sized + Send + Sync + 'static {
    /// Providers this type declares for the scope it is resolved in.
    fn providers() -> Vec<Provider> {
        Vec::new()
    }

    /// Ordered constructor-injection keys.
    fn inject_keys() -> Vec<Key> {
        Vec::new()
    }

    /// Property-injection entries.
    fn property_keys() -> Vec<PropertyKey> {
        Vec::new()
    }

    /// Build the instance from the resolved constructor arguments.
    fn construct(args: Arguments) -> Result<Self>;

    /// Apply one resolved property-injection entry.
    fn inject_property(&mut self, property: &PropertyKey, _value: Instance) -> Result<()> {
        Err(StrataError::UnknownProperty {
            class: std::any::type_name::<Self>().to_string(),
            property: property.name().to_string(),
        })
    }

    /// Post-construction hook, invoked once after every injection is applied.
    fn after_construct(&mut self) {}
}

/// Post-construction hook for types deriving `Injectable` with
/// `#[injectable(after_construct)]`.
pub trait AfterConstruct {
    fn after_construct(&mut self);
}

/// Resolved constructor arguments, consumed in declaration order.
pub struct Arguments {
    class: &'static str,
    position: usize,
    values: std::vec::IntoIter<(Key, Instance)>,
}

impl Arguments {
    pub fn new(class: &'static str, values: Vec<(Key, Instance)>) -> Self {
        Self {
            class,
            position: 0,
            values: values.into_iter(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.len() == 0
    }

    fn take(&mut self) -> Result<(Key, Instance)> {
        let position = self.position;
        self.position += 1;
        self.values.next().ok_or_else(|| StrataError::MissingArgument {
            class: self.class.to_string(),
            position,
        })
    }

    /// Next argument as a concrete type.
    pub fn next<T: Send + Sync + 'static>(&mut self) -> Result<Arc<T>> {
        let (key, value) = self.take()?;
        value
            .downcast::<T>()
            .map_err(|_| StrataError::DowncastFailed {
                key: key.to_string(),
                expected: std::any::type_name::<T>().to_string(),
            })
    }

    /// Next argument as a trait object bound with [`Provider::shared`].
    pub fn next_trait<T: ?Sized + Send + Sync + 'static>(&mut self) -> Result<Arc<T>> {
        let wrapper = self.next::<Arc<T>>()?;
        Ok(wrapper.as_ref().clone())
    }

    /// Next argument cloned out of its `Arc`.
    pub fn next_value<T: Clone + Send + Sync + 'static>(&mut self) -> Result<T> {
        self.next::<T>().map(|value| value.as_ref().clone())
    }
}
