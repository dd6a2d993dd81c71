//! The object diagram produced by one snapshot.
//!
//! Nodes live in one flat map keyed by object id; links reference ids rather
//! than nodes, so cyclic heaps never turn into cyclic ownership. Every add
//! operation is idempotent and nothing is ever removed.

use std::collections::{BTreeMap, BTreeSet};

use odiag_remote::ObjectId;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttributeValue {
    pub name: String,
    pub declared_type: String,
    /// Display text, already formatted (`5`, `'c'`, `"text"`, `null`).
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramNode {
    pub id: ObjectId,
    pub type_name: String,
    /// Variable name, field name or synthetic role (`this`, `0`, `key`).
    pub name: String,
    #[serde(default)]
    pub attributes: BTreeSet<AttributeValue>,
}

impl DiagramNode {
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.iter().find(|attr| attr.name == name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Link {
    pub from: ObjectId,
    pub to: ObjectId,
    pub role: String,
}

impl Link {
    pub fn new(from: ObjectId, to: ObjectId, role: impl Into<String>) -> Self {
        Self {
            from,
            to,
            role: role.into(),
        }
    }
}

/// A root local that never becomes a node.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PrimitiveRootValue {
    pub name: String,
    pub declared_type: String,
    pub value: String,
}

impl PrimitiveRootValue {
    pub fn new(
        name: impl Into<String>,
        declared_type: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            value: value.into(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagram {
    objects: BTreeMap<ObjectId, DiagramNode>,
    links: BTreeSet<Link>,
    primitive_root_values: BTreeSet<PrimitiveRootValue>,
}

impl Diagram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node unless one with the same id exists. Returns `true` if the
    /// node is new.
    pub fn add_object(
        &mut self,
        id: ObjectId,
        type_name: impl Into<String>,
        name: impl Into<String>,
    ) -> bool {
        if self.objects.contains_key(&id) {
            return false;
        }
        self.objects.insert(
            id,
            DiagramNode {
                id,
                type_name: type_name.into(),
                name: name.into(),
                attributes: BTreeSet::new(),
            },
        );
        true
    }

    pub fn add_attribute(
        &mut self,
        node: ObjectId,
        name: impl Into<String>,
        declared_type: impl Into<String>,
        value: impl Into<String>,
    ) -> bool {
        let Some(target) = self.objects.get_mut(&node) else {
            tracing::warn!(target: "odiag.explore", node, "attribute for unknown node ignored");
            return false;
        };
        target.attributes.insert(AttributeValue {
            name: name.into(),
            declared_type: declared_type.into(),
            value: value.into(),
        })
    }

    pub fn add_link(&mut self, from: ObjectId, to: ObjectId, role: impl Into<String>) -> bool {
        self.links.insert(Link::new(from, to, role))
    }

    pub fn add_primitive_root_value(
        &mut self,
        name: impl Into<String>,
        declared_type: impl Into<String>,
        value: impl Into<String>,
    ) -> bool {
        self.insert_primitive_root_value(PrimitiveRootValue::new(name, declared_type, value))
    }

    pub(crate) fn insert_primitive_root_value(&mut self, value: PrimitiveRootValue) -> bool {
        self.primitive_root_values.insert(value)
    }

    pub fn objects(&self) -> &BTreeMap<ObjectId, DiagramNode> {
        &self.objects
    }

    pub fn links(&self) -> &BTreeSet<Link> {
        &self.links
    }

    pub fn primitive_root_values(&self) -> &BTreeSet<PrimitiveRootValue> {
        &self.primitive_root_values
    }

    pub fn object(&self, id: ObjectId) -> Option<&DiagramNode> {
        self.objects.get(&id)
    }

    pub fn contains_object(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn object_ids(&self) -> BTreeSet<ObjectId> {
        self.objects.keys().copied().collect()
    }

    /// Outgoing links of `id`, in `(to, role)` order.
    pub fn links_from(&self, id: ObjectId) -> impl Iterator<Item = &Link> + '_ {
        self.links.iter().filter(move |link| link.from == id)
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.links.is_empty() && self.primitive_root_values.is_empty()
    }
}
