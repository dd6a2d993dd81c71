use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    FieldValue, FrameId, ObjectId, ObjectRef, RemoteError, RemoteValue, RemoteVariable, Result,
    StackFrameInfo, ThreadId,
};

const LIST_INTERFACES: &[&str] = &["java.util.List", "java.util.Collection", "java.lang.Iterable"];
const SET_INTERFACES: &[&str] = &["java.util.Set", "java.util.Collection", "java.lang.Iterable"];
const MAP_INTERFACES: &[&str] = &["java.util.Map"];
const MAP_ENTRY_INTERFACES: &[&str] = &["java.util.Map$Entry"];

/// In-memory description of a suspended debuggee.
///
/// This doubles as the JSON fixture format read by the `odiag` CLI: object ids
/// are map keys, values use the tagged [`RemoteValue`] encoding.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MockHeap {
    #[serde(default)]
    pub objects: BTreeMap<ObjectId, MockObject>,
    #[serde(default)]
    pub threads: BTreeMap<ThreadId, MockThread>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MockObject {
    pub runtime_type: String,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(flatten)]
    pub kind: MockObjectKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum MockObjectKind {
    Plain {
        #[serde(default)]
        fields: Vec<MockField>,
    },
    String {
        value: String,
    },
    Array {
        #[serde(default)]
        elements: Vec<RemoteValue>,
    },
    /// A `java.util.Collection`; iterated through `iterator()`.
    Collection {
        #[serde(default)]
        elements: Vec<RemoteValue>,
    },
    /// A `java.util.Map`; `entries` are ids of [`MockObjectKind::MapEntry`] objects.
    Map {
        #[serde(default)]
        entries: Vec<ObjectId>,
    },
    MapEntry {
        key: RemoteValue,
        value: RemoteValue,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MockField {
    pub name: String,
    pub declared_type: String,
    #[serde(default)]
    pub is_static: bool,
    pub value: RemoteValue,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MockThread {
    #[serde(default)]
    pub frames: Vec<MockFrame>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MockFrame {
    pub id: FrameId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub this: Option<ObjectId>,
    /// `None` models a class compiled without a local variable table.
    #[serde(default)]
    pub locals: Option<Vec<MockLocal>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MockLocal {
    pub name: String,
    pub declared_type: String,
    pub value: RemoteValue,
}

impl MockObject {
    pub fn plain(runtime_type: impl Into<String>, fields: Vec<MockField>) -> Self {
        Self {
            runtime_type: runtime_type.into(),
            interfaces: Vec::new(),
            kind: MockObjectKind::Plain { fields },
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self {
            runtime_type: "java.lang.String".to_string(),
            interfaces: vec![
                "java.lang.CharSequence".to_string(),
                "java.lang.Comparable".to_string(),
            ],
            kind: MockObjectKind::String {
                value: value.into(),
            },
        }
    }

    /// A wrapper such as `java.lang.Integer` holding `value` in its `value` field.
    pub fn boxed(wrapper: impl Into<String>, value: RemoteValue) -> Self {
        let declared_type = value.primitive_type_name().unwrap_or("java.lang.Object");
        Self::plain(wrapper, vec![MockField::new("value", declared_type, value)])
    }

    pub fn array(element_type: &str, elements: Vec<RemoteValue>) -> Self {
        Self {
            runtime_type: format!("{element_type}[]"),
            interfaces: vec!["java.lang.Cloneable".to_string(), "java.io.Serializable".to_string()],
            kind: MockObjectKind::Array { elements },
        }
    }

    pub fn list(runtime_type: impl Into<String>, elements: Vec<RemoteValue>) -> Self {
        Self {
            runtime_type: runtime_type.into(),
            interfaces: owned(LIST_INTERFACES),
            kind: MockObjectKind::Collection { elements },
        }
    }

    pub fn set(runtime_type: impl Into<String>, elements: Vec<RemoteValue>) -> Self {
        Self {
            runtime_type: runtime_type.into(),
            interfaces: owned(SET_INTERFACES),
            kind: MockObjectKind::Collection { elements },
        }
    }

    pub fn map(runtime_type: impl Into<String>, entries: Vec<ObjectId>) -> Self {
        Self {
            runtime_type: runtime_type.into(),
            interfaces: owned(MAP_INTERFACES),
            kind: MockObjectKind::Map { entries },
        }
    }

    pub fn map_entry(runtime_type: impl Into<String>, key: RemoteValue, value: RemoteValue) -> Self {
        Self {
            runtime_type: runtime_type.into(),
            interfaces: owned(MAP_ENTRY_INTERFACES),
            kind: MockObjectKind::MapEntry { key, value },
        }
    }

    pub fn with_interfaces<I, S>(mut self, interfaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interfaces = interfaces.into_iter().map(Into::into).collect();
        self
    }
}

impl MockField {
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>, value: RemoteValue) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            is_static: false,
            value,
        }
    }

    pub fn new_static(
        name: impl Into<String>,
        declared_type: impl Into<String>,
        value: RemoteValue,
    ) -> Self {
        Self {
            is_static: true,
            ..Self::new(name, declared_type, value)
        }
    }
}

impl MockLocal {
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>, value: RemoteValue) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            value,
        }
    }
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl MockHeap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn insert(&mut self, id: ObjectId, object: MockObject) -> ObjectRef {
        let obj_ref = ObjectRef::new(id, object.runtime_type.clone());
        self.objects.insert(id, object);
        obj_ref
    }

    /// Adds a frame to `thread`; frames are pushed innermost-first.
    pub fn push_frame(&mut self, thread: ThreadId, frame: MockFrame) {
        self.threads.entry(thread).or_default().frames.push(frame);
    }

    pub fn object(&self, id: ObjectId) -> Result<&MockObject> {
        self.objects.get(&id).ok_or(RemoteError::InvalidObject(id))
    }

    pub fn object_ref(&self, id: ObjectId) -> Result<ObjectRef> {
        self.object(id)
            .map(|obj| ObjectRef::new(id, obj.runtime_type.clone()))
    }

    /// `RemoteValue::Object` for `id`, or `RemoteValue::Null` when the id is unknown.
    pub fn value(&self, id: ObjectId) -> RemoteValue {
        match self.object_ref(id) {
            Ok(obj) => RemoteValue::Object(obj),
            Err(_) => RemoteValue::Null,
        }
    }

    pub fn frame(&self, frame: FrameId) -> Option<(ThreadId, &MockFrame)> {
        self.threads.iter().find_map(|(thread, info)| {
            info.frames
                .iter()
                .find(|f| f.id == frame)
                .map(|f| (*thread, f))
        })
    }

    pub fn stack_frames(&self, thread: ThreadId) -> Result<Vec<StackFrameInfo>> {
        let info = self
            .threads
            .get(&thread)
            .ok_or(RemoteError::InvalidThreadState(thread))?;
        Ok(info
            .frames
            .iter()
            .map(|f| StackFrameInfo {
                id: f.id,
                name: f.name.clone(),
                line: f.line,
            })
            .collect())
    }

    pub fn fields(&self, id: ObjectId) -> Result<Vec<FieldValue>> {
        let obj = self.object(id)?;
        Ok(match &obj.kind {
            MockObjectKind::Plain { fields } => fields
                .iter()
                .map(|f| FieldValue {
                    name: f.name.clone(),
                    declared_type: f.declared_type.clone(),
                    is_static: f.is_static,
                    value: f.value.clone(),
                })
                .collect(),
            // Internal representation of JDK containers is not modelled.
            _ => Vec::new(),
        })
    }

    pub fn string_value(&self, id: ObjectId) -> Result<String> {
        match &self.object(id)?.kind {
            MockObjectKind::String { value } => Ok(value.clone()),
            _ => Err(RemoteError::Protocol(format!(
                "object {id} is not a java.lang.String"
            ))),
        }
    }

    /// Children as the host's variables view would present them.
    pub fn children(&self, id: ObjectId) -> Result<Vec<RemoteVariable>> {
        let obj = self.object(id)?;
        let indexed = |elements: &[RemoteValue], declared: &str| {
            elements
                .iter()
                .enumerate()
                .map(|(idx, value)| RemoteVariable {
                    name: idx.to_string(),
                    declared_type: value.type_name_or(declared),
                    value: value.clone(),
                })
                .collect::<Vec<_>>()
        };

        Ok(match &obj.kind {
            MockObjectKind::Plain { .. } => self
                .fields(id)?
                .into_iter()
                .map(|f| RemoteVariable {
                    name: f.name,
                    declared_type: f.declared_type,
                    value: f.value,
                })
                .collect(),
            MockObjectKind::String { .. } => Vec::new(),
            MockObjectKind::Array { elements } => {
                let element_type = obj
                    .runtime_type
                    .strip_suffix("[]")
                    .unwrap_or("java.lang.Object");
                indexed(elements, element_type)
            }
            MockObjectKind::Collection { elements } => indexed(elements, "java.lang.Object"),
            MockObjectKind::Map { entries } => {
                let entries: Vec<_> = entries.iter().map(|e| self.value(*e)).collect();
                indexed(&entries, "java.util.Map$Entry")
            }
            MockObjectKind::MapEntry { key, value } => vec![
                RemoteVariable {
                    name: "key".to_string(),
                    declared_type: key.type_name_or("java.lang.Object"),
                    value: key.clone(),
                },
                RemoteVariable {
                    name: "value".to_string(),
                    declared_type: value.type_name_or("java.lang.Object"),
                    value: value.clone(),
                },
            ],
        })
    }
}
