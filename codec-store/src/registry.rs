//! Static metadata of every component the store can build.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Other,
    Video,
    Audio,
    Image,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Other,
    Decoder,
    Encoder,
}

/// Classification metadata used by codec selection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentTraits {
    /// Unique canonical name, e.g. "c2.vp9.decoder"
    pub name: String,
    pub domain: Domain,
    pub kind: Kind,
    /// Lower is preferred.
    pub rank: u32,
    /// MIME type, e.g. "video/x-vnd.on2.vp9"
    pub media_type: String,
    /// Alternate names; unique only together with `media_type`.
    pub aliases: Vec<String>,
}

impl ComponentTraits {
    pub fn new(
        name: impl Into<String>,
        domain: Domain,
        kind: Kind,
        rank: u32,
        media_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            domain,
            kind,
            rank,
            media_type: media_type.into(),
            aliases: Vec::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }
}

/// Immutable table of [`ComponentTraits`].
///
/// Primary lookup goes through the canonical name; alias lookup goes through
/// the composite (alias, media type) key.
#[derive(Debug, Default)]
pub struct TraitRegistry {
    traits: Vec<ComponentTraits>,
    by_name: HashMap<String, usize>,
    by_alias: HashMap<(String, String), usize>,
    alias_slots: HashMap<String, Vec<usize>>,
}

impl TraitRegistry {
    pub fn new(traits: Vec<ComponentTraits>) -> anyhow::Result<Self> {
        let mut registry = Self::default();
        for t in traits {
            registry.insert(t)?;
        }
        Ok(registry)
    }

    /// Adds one entry and returns its slot. Only used while the store is being built.
    pub(crate) fn insert(&mut self, mut traits: ComponentTraits) -> anyhow::Result<usize> {
        if traits.name.is_empty() {
            return Err(anyhow::anyhow!("component name must not be empty"));
        }
        if self.by_name.contains_key(&traits.name) {
            return Err(anyhow::anyhow!(
                "component '{}' registered twice",
                traits.name
            ));
        }

        let name = traits.name.clone();
        traits.aliases.retain(|alias| alias != &name);
        let mut local = Vec::with_capacity(traits.aliases.len());
        for alias in &traits.aliases {
            let key = (alias.clone(), traits.media_type.clone());
            if self.by_alias.contains_key(&key) || local.contains(&key) {
                return Err(anyhow::anyhow!(
                    "alias '{}' for media type '{}' is already taken",
                    alias,
                    traits.media_type
                ));
            }
            local.push(key);
        }

        let slot = self.traits.len();
        for key in local {
            self.alias_slots.entry(key.0.clone()).or_default().push(slot);
            self.by_alias.insert(key, slot);
        }
        self.by_name.insert(name, slot);
        self.traits.push(traits);
        Ok(slot)
    }

    pub fn list(&self) -> &[ComponentTraits] {
        &self.traits
    }

    pub fn len(&self) -> usize {
        self.traits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traits.is_empty()
    }

    pub fn lookup(&self, name: &str) -> Option<&ComponentTraits> {
        self.by_name.get(name).map(|&slot| &self.traits[slot])
    }

    pub fn resolve_alias(&self, alias: &str, media_type: &str) -> Option<&ComponentTraits> {
        self.by_alias
            .get(&(alias.to_string(), media_type.to_string()))
            .map(|&slot| &self.traits[slot])
    }

    /// Canonical name first, then an alias that is unambiguous across media types.
    pub(crate) fn slot(&self, name: &str) -> Option<usize> {
        if let Some(&slot) = self.by_name.get(name) {
            return Some(slot);
        }
        match self.alias_slots.get(name).map(Vec::as_slice) {
            Some([slot]) => Some(*slot),
            Some(slots) if slots.len() > 1 => {
                log::debug!("alias '{}' is ambiguous across {} components", name, slots.len());
                None
            }
            _ => None,
        }
    }

    pub(crate) fn get(&self, slot: usize) -> Option<&ComponentTraits> {
        self.traits.get(slot)
    }

    /// Components for one media type, best rank first.
    pub fn find(&self, media_type: &str, kind: Option<Kind>) -> Vec<&ComponentTraits> {
        let mut found: Vec<&ComponentTraits> = self
            .traits
            .iter()
            .filter(|t| t.media_type == media_type && kind.is_none_or(|k| t.kind == k))
            .collect();
        found.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.name.cmp(&b.name)));
        found
    }
}
