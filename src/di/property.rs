use crate::di::{Instance, Key};
use crate::error::{Result, StrataError};
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, PoisonError, RwLock};

fn downcast<T: Send + Sync + 'static>(key: &Key, value: Instance) -> Result<Arc<T>> {
    value
        .downcast::<T>()
        .map_err(|_| StrataError::DowncastFailed {
            key: key.to_string(),
            expected: std::any::type_name::<T>().to_string(),
        })
}

/// Read-only injected property.
///
/// Filled once by the injector while the owner is still exclusively borrowed;
/// there is no way to replace it after the owner has been shared.
///
/// # Panics
///
/// Dereferencing panics if the property was never injected, which only
/// happens when the value was built outside an injector.
pub struct Property<T> {
    value: Option<Arc<T>>,
}

impl<T: Send + Sync + 'static> Property<T> {
    pub fn inject(&mut self, key: &Key, value: Instance) -> Result<()> {
        self.value = Some(downcast::<T>(key, value)?);
        Ok(())
    }

    pub fn get(&self) -> Option<&Arc<T>> {
        self.value.as_ref()
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    /// Shared handle to the injected value.
    ///
    /// # Panics
    ///
    /// Panics if the property was never injected, like dereferencing does.
    pub fn to_arc(&self) -> Arc<T> {
        Arc::clone(self.deref_arc())
    }

    fn deref_arc(&self) -> &Arc<T> {
        match &self.value {
            Some(value) => value,
            None => panic!(
                "property of type '{}' read before injection",
                std::any::type_name::<T>()
            ),
        }
    }
}

impl<T> Default for Property<T> {
    fn default() -> Self {
        Self { value: None }
    }
}

impl<T: Send + Sync + 'static> Deref for Property<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.deref_arc()
    }
}

impl<T: fmt::Debug> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Property").field(&self.value).finish()
    }
}

/// Injected property that stays reassignable through a shared reference.
pub struct MutableProperty<T> {
    value: RwLock<Option<Arc<T>>>,
}

impl<T: Send + Sync + 'static> MutableProperty<T> {
    pub fn inject(&mut self, key: &Key, value: Instance) -> Result<()> {
        let value = downcast::<T>(key, value)?;
        *self.value.get_mut().unwrap_or_else(PoisonError::into_inner) = Some(value);
        Ok(())
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set(&self, value: impl Into<Arc<T>>) {
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = Some(value.into());
    }

    pub fn is_set(&self) -> bool {
        self.value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl<T: Clone + Send + Sync + 'static> MutableProperty<T> {
    /// Current value cloned out, or `fallback` when never injected.
    pub fn value_or(&self, fallback: T) -> T {
        self.get().map(|value| value.as_ref().clone()).unwrap_or(fallback)
    }
}

impl<T> Default for MutableProperty<T> {
    fn default() -> Self {
        Self {
            value: RwLock::new(None),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for MutableProperty<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.value.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_tuple("MutableProperty").field(&*value).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_is_filled_by_inject() {
        let mut property = Property::<String>::default();
        assert!(!property.is_set());
        property
            .inject(&Key::token("name"), Arc::new("strata".to_string()))
            .unwrap();
        assert_eq!(property.as_str(), "strata");
    }

    #[test]
    fn property_rejects_the_wrong_type() {
        let mut property = Property::<String>::default();
        let err = property.inject(&Key::token("name"), Arc::new(7u8)).unwrap_err();
        assert!(matches!(err, StrataError::DowncastFailed { .. }));
    }

    #[test]
    fn mutable_property_can_be_replaced_through_shared_ref() {
        let mut property = MutableProperty::<u16>::default();
        property.inject(&Key::token("status"), Arc::new(200u16)).unwrap();

        let shared = Arc::new(property);
        shared.set(404u16);
        assert_eq!(shared.value_or(0), 404);
    }
}
