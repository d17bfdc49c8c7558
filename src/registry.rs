//! Typed name→entity map with default selection and autoload — §4.6
//! "NameRegistry".

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    Sink,
    Source,
    SinkInput,
    SourceOutput,
    Module,
    Client,
    SampleCache,
    Autoload,
}

/// Validates names per §4.6: printable ASCII, length in [1, 127], not
/// starting with a digit, no whitespace or control characters.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 127 {
        return Err(Error::InvalidSpec(format!("name length {} out of range [1, 127]", name.len())));
    }
    if name.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        return Err(Error::InvalidSpec("name must not start with a digit".into()));
    }
    if !name.chars().all(|c| c.is_ascii_graphic()) {
        return Err(Error::InvalidSpec("name must be printable ASCII with no whitespace or control characters".into()));
    }
    Ok(())
}

/// Invoked when `get(..., autoload=true)` misses and the (name, type) pair
/// has an autoload entry registered — the module-loader collaborator.
#[async_trait]
pub trait AutoloadCollaborator: Send + Sync {
    async fn load_for(&self, name: &str, kind: EntityType) -> Result<()>;
}

struct TypeTable<E> {
    by_name: HashMap<String, E>,
    order: Vec<String>,
    default: Option<String>,
}

impl<E> Default for TypeTable<E> {
    fn default() -> Self {
        Self { by_name: HashMap::new(), order: Vec::new(), default: None }
    }
}

/// `name -> entity` map, one independent table per `EntityType`, with
/// first-come default selection and an optional autoload table consulted
/// on miss.
pub struct NameRegistry<E: Clone> {
    tables: DashMap<EntityType, TypeTable<E>>,
    autoload: DashMap<(String, EntityType), ()>,
    loader: Option<Arc<dyn AutoloadCollaborator>>,
}

impl<E: Clone> NameRegistry<E> {
    pub fn new(loader: Option<Arc<dyn AutoloadCollaborator>>) -> Self {
        Self { tables: DashMap::new(), autoload: DashMap::new(), loader }
    }

    pub fn mark_autoloadable(&self, name: &str, kind: EntityType) {
        self.autoload.insert((name.to_string(), kind), ());
    }

    /// Register `entity` under `name`. On collision, either fails or
    /// appends `.N` for the first free `N`, per `fail_on_collision`.
    pub fn register(&self, name: &str, kind: EntityType, entity: E, fail_on_collision: bool) -> Result<String> {
        validate_name(name)?;
        let mut table = self.tables.entry(kind).or_default();

        if !table.by_name.contains_key(name) {
            table.by_name.insert(name.to_string(), entity);
            table.order.push(name.to_string());
            if table.default.is_none() {
                table.default = Some(name.to_string());
            }
            return Ok(name.to_string());
        }

        if fail_on_collision {
            return Err(Error::NameCollision(name.to_string()));
        }

        let mut n = 1u32;
        loop {
            let candidate = format!("{name}.{n}");
            if !table.by_name.contains_key(&candidate) {
                table.by_name.insert(candidate.clone(), entity);
                table.order.push(candidate.clone());
                if table.default.is_none() {
                    table.default = Some(candidate.clone());
                }
                return Ok(candidate);
            }
            n += 1;
        }
    }

    pub fn unregister(&self, name: &str, kind: EntityType) -> bool {
        let Some(mut table) = self.tables.get_mut(&kind) else { return false };
        let removed = table.by_name.remove(name).is_some();
        if removed {
            table.order.retain(|n| n != name);
            if table.default.as_deref() == Some(name) {
                table.default = table.order.first().cloned();
            }
        }
        removed
    }

    pub fn set_default(&self, name: &str, kind: EntityType) -> Result<()> {
        let mut table = self.tables.entry(kind).or_default();
        if !table.by_name.contains_key(name) {
            return Err(Error::NotFound(name.to_string()));
        }
        table.default = Some(name.to_string());
        Ok(())
    }

    /// Resolve a name without autoload. `None` resolves to the type's
    /// current default.
    pub fn get_sync(&self, name: Option<&str>, kind: EntityType) -> Result<E> {
        let table = self.tables.entry(kind).or_default();
        let key = match name {
            Some(n) => n.to_string(),
            None => table.default.clone().ok_or_else(|| Error::NotFound(format!("no default {kind:?}")))?,
        };
        table.by_name.get(&key).cloned().ok_or_else(|| Error::NotFound(key))
    }

    /// Resolve `name`, invoking the autoload collaborator at most once on
    /// a miss when `autoload` is set and the name is marked autoloadable —
    /// §8 P10.
    pub async fn get(&self, name: Option<&str>, kind: EntityType, autoload: bool) -> Result<E> {
        match self.get_sync(name, kind) {
            Ok(entity) => Ok(entity),
            Err(e) => {
                let Some(name) = name else { return Err(e) };
                if !autoload || !self.autoload.contains_key(&(name.to_string(), kind)) {
                    return Err(e);
                }
                let loader = self.loader.as_ref().ok_or(e)?;
                loader.load_for(name, kind).await?;
                self.get_sync(Some(name), kind)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_collision_auto_renames() {
        let reg: NameRegistry<u32> = NameRegistry::new(None);
        reg.register("alsa_output", EntityType::Sink, 1, false).unwrap();
        let name2 = reg.register("alsa_output", EntityType::Sink, 2, false).unwrap();
        assert_eq!(name2, "alsa_output.1");
    }

    #[test]
    fn register_collision_fails_when_requested() {
        let reg: NameRegistry<u32> = NameRegistry::new(None);
        reg.register("alsa_output", EntityType::Sink, 1, false).unwrap();
        assert!(matches!(
            reg.register("alsa_output", EntityType::Sink, 2, true),
            Err(Error::NameCollision(_))
        ));
    }

    #[test]
    fn default_is_first_come_and_follows_removal() {
        let reg: NameRegistry<u32> = NameRegistry::new(None);
        reg.register("a", EntityType::Sink, 1, false).unwrap();
        reg.register("b", EntityType::Sink, 2, false).unwrap();
        assert_eq!(reg.get_sync(None, EntityType::Sink).unwrap(), 1);
        reg.unregister("a", EntityType::Sink);
        assert_eq!(reg.get_sync(None, EntityType::Sink).unwrap(), 2);
    }

    #[test]
    fn name_validation_rejects_leading_digit_and_control_chars() {
        assert!(validate_name("9sink").is_err());
        assert!(validate_name("has space").is_err());
        assert!(validate_name("sink\u{0007}").is_err());
        assert!(validate_name("valid_name").is_ok());
    }

    #[tokio::test]
    async fn autoload_miss_without_collaborator_returns_not_found() {
        let reg: NameRegistry<u32> = NameRegistry::new(None);
        reg.mark_autoloadable("lazy_sink", EntityType::Sink);
        let result = reg.get(Some("lazy_sink"), EntityType::Sink, true).await;
        assert!(result.is_err());
    }

    struct Loader;
    #[async_trait]
    impl AutoloadCollaborator for Loader {
        async fn load_for(&self, _name: &str, _kind: EntityType) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn autoload_retries_once_after_loader_runs() {
        let reg: Arc<NameRegistry<u32>> = Arc::new(NameRegistry::new(Some(Arc::new(Loader))));
        reg.mark_autoloadable("lazy_sink", EntityType::Sink);
        // The loader in this test doesn't actually register anything, so
        // the retry still misses — exercising "at most one attempt"
        // rather than a successful autoload.
        let result = reg.get(Some("lazy_sink"), EntityType::Sink, true).await;
        assert!(result.is_err());
    }
}
