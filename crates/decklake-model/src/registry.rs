// SPDX-License-Identifier: Apache-2.0

use crate::error::ModelError;
use crate::kind::CollectionType;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Builds the empty payload for one tag.
pub type TypeConstructor = fn() -> CollectionType;

/// Tag to payload-constructor map.
///
/// The set of payload shapes is closed (see [`CollectionType`]); the registry
/// decides which of those tags a deployment accepts. It is populated before
/// any concurrent access and never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    constructors: BTreeMap<&'static str, TypeConstructor>,
}

impl TypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in tag, each registered exactly once.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for tag in CollectionType::TAGS {
            registry.constructors.insert(tag, builtin_constructor(tag));
        }
        registry
    }

    pub fn register(
        &mut self,
        tag: &'static str,
        constructor: TypeConstructor,
    ) -> Result<(), ModelError> {
        if self.constructors.contains_key(tag) {
            return Err(ModelError::DuplicateTag(tag.to_string()));
        }
        let produced = constructor().tag();
        if produced != tag {
            return Err(ModelError::TagMismatch {
                registered: tag.to_string(),
                produced: produced.to_string(),
            });
        }
        self.constructors.insert(tag, constructor);
        Ok(())
    }

    #[must_use]
    pub fn is_registered(&self, tag: &str) -> bool {
        self.constructors.contains_key(tag)
    }

    pub fn ensure_registered(&self, tag: &str) -> Result<(), ModelError> {
        if self.is_registered(tag) {
            Ok(())
        } else {
            Err(ModelError::UnregisteredTag(tag.to_string()))
        }
    }

    pub fn zero_value(&self, tag: &str) -> Result<CollectionType, ModelError> {
        self.constructors
            .get(tag)
            .map(|ctor| ctor())
            .ok_or_else(|| ModelError::UnregisteredTag(tag.to_string()))
    }

    /// Decodes an `inner` payload for `tag`, rejecting tags not registered here.
    pub fn decode(&self, tag: &str, inner: serde_json::Value) -> Result<CollectionType, ModelError> {
        self.ensure_registered(tag)?;
        let envelope = serde_json::json!({ "type": tag, "inner": inner });
        serde_json::from_value(envelope).map_err(|e| ModelError::Decode(e.to_string()))
    }

    pub fn tags(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.constructors.keys().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

/// Process-wide registry of built-in tags, initialised on first use.
pub fn builtin_registry() -> &'static TypeRegistry {
    static REGISTRY: OnceLock<TypeRegistry> = OnceLock::new();
    REGISTRY.get_or_init(TypeRegistry::builtin)
}

fn builtin_constructor(tag: &str) -> TypeConstructor {
    match tag {
        "MagicDeck" => || CollectionType::MagicDeck(Default::default()),
        "MagicSet" => || CollectionType::MagicSet(Default::default()),
        "MagicCube" => || CollectionType::MagicCube(Default::default()),
        "YGODeck" => || CollectionType::YgoDeck(Default::default()),
        "YGOCollection" => || CollectionType::YgoCollection(Default::default()),
        "PokemonDeck" => || CollectionType::PokemonDeck(Default::default()),
        "PokemonSet" => || CollectionType::PokemonSet(Default::default()),
        "PokemonBinder" => || CollectionType::PokemonBinder(Default::default()),
        "DigimonDeck" => || CollectionType::DigimonDeck(Default::default()),
        _ => || CollectionType::RiftboundDeck(Default::default()),
    }
}
