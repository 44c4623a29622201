//! The bean registry: a `TypeId`-keyed store of singletons provided to the
//! [`AppBuilder`](crate::builder::AppBuilder) and injected into whatever
//! shared state the application builds.
//!
//! The upstream builder this crate is patterned on checks bean dependency
//! graphs at compile time via a phantom-typed cons-list. That machinery
//! depends on a type-level bookkeeping module that isn't carried into this
//! workspace; instead, `BeanRegistry` resolves dependencies at `build()`
//! time and panics with the offending type name if something is missing.
//! Tests that construct a builder exercise this path directly, so a missing
//! bean is caught long before it would reach production traffic.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
pub enum BeanError {
    Missing(&'static str),
}

impl std::fmt::Display for BeanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BeanError::Missing(ty) => write!(f, "no bean registered for type `{ty}`"),
        }
    }
}

impl std::error::Error for BeanError {}

/// A type-erased store of singleton beans, keyed by `TypeId`.
#[derive(Default, Clone)]
pub struct BeanRegistry {
    beans: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl BeanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bean, overwriting any previous bean of the same type.
    pub fn provide<B: Send + Sync + 'static>(&mut self, bean: B) {
        self.beans.insert(TypeId::of::<B>(), Arc::new(bean));
    }

    /// Fetch a bean by type, panicking with a descriptive message if it was
    /// never provided. Intended for use during `build()`, where a missing
    /// bean is a programming error rather than a runtime condition to
    /// recover from.
    pub fn require<B: Send + Sync + 'static>(&self) -> Arc<B> {
        match self.try_get::<B>() {
            Some(bean) => bean,
            None => panic!("{}", BeanError::Missing(std::any::type_name::<B>())),
        }
    }

    pub fn try_get<B: Send + Sync + 'static>(&self) -> Option<Arc<B>> {
        self.beans
            .get(&TypeId::of::<B>())
            .and_then(|b| b.clone().downcast::<B>().ok())
    }

    pub fn contains<B: Send + Sync + 'static>(&self) -> bool {
        self.beans.contains_key(&TypeId::of::<B>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Widget(u32);

    #[test]
    fn provide_then_require_round_trips() {
        let mut registry = BeanRegistry::new();
        registry.provide(Widget(7));
        assert_eq!(*registry.require::<Widget>(), Widget(7));
    }

    #[test]
    #[should_panic(expected = "no bean registered")]
    fn require_panics_on_missing_bean() {
        let registry = BeanRegistry::new();
        registry.require::<Widget>();
    }
}
