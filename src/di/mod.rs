mod injectable;
mod injector;
mod key;
pub mod metadata;
mod property;
mod provider;

pub use injectable::{AfterConstruct, Arguments, Injectable};
pub use injector::Injector;
pub use key::{Key, TypeKey};
pub use property::{MutableProperty, Property};
pub use provider::{Class, Instance, PropertyKey, Provider};
