//! Descriptor-table queries used by the injector.
//!
//! Injection metadata is plain data produced by [`Injectable`](crate::di::Injectable)
//! implementations; these helpers validate and combine it.

use crate::di::{Key, PropertyKey, Provider};
use crate::error::{Result, StrataError};

/// Reject descriptors carrying neither a class nor a value.
pub fn verify_provider(provider: Provider) -> Result<Provider> {
    if provider.use_class.is_none() && provider.use_value.is_none() {
        return Err(StrataError::InvalidProvider {
            key: provider.provide.to_string(),
        });
    }
    Ok(provider)
}

pub fn verify_providers(providers: Vec<Provider>) -> Result<Vec<Provider>> {
    providers.into_iter().map(verify_provider).collect()
}

/// Declared providers first, minus the ones overridden, then the overrides.
pub fn merge_providers(declared: Vec<Provider>, overrides: Vec<Provider>) -> Vec<Provider> {
    let mut merged: Vec<Provider> = declared
        .into_iter()
        .filter(|item| !overrides.iter().any(|o| o.provide == item.provide))
        .collect();
    merged.extend(overrides);
    merged
}

pub fn constructor_providers(provider: &Provider) -> Vec<Provider> {
    provider
        .use_class
        .as_ref()
        .map(|class| class.providers())
        .unwrap_or_default()
}

pub fn constructor_inject_keys(provider: &Provider) -> Vec<Key> {
    provider
        .use_class
        .as_ref()
        .map(|class| class.inject_keys())
        .unwrap_or_default()
}

pub fn constructor_prototype_keys(provider: &Provider) -> Vec<PropertyKey> {
    provider
        .use_class
        .as_ref()
        .map(|class| class.property_keys())
        .unwrap_or_default()
}
