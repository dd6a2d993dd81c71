//! Remote debug facade for odiag.
//!
//! The object-graph engine in the `odiag` crate never talks to a debuggee
//! directly. It consumes the two traits defined here:
//!
//! - [`RemoteAccess`]: blocking reads of frames, locals, fields and arrays plus
//!   zero-argument method invocation on a suspended thread.
//! - [`AsyncRemoteAccess`]: the host's non-blocking child resolution, which
//!   delivers children in batches through a [`ChildSink`].
//!
//! Both are implemented in memory by [`MockRemote`] / [`MockAsyncRemote`] /
//! [`ManualAsyncRemote`] on top of a serde-friendly [`MockHeap`].

mod heap;
mod mock;
mod mock_async;

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use heap::{MockField, MockFrame, MockHeap, MockLocal, MockObject, MockObjectKind, MockThread};
pub use mock::{Invocation, MockRemote};
pub use mock_async::{ManualAsyncRemote, MockAsyncRemote, PendingRequest};

pub type ThreadId = u64;
pub type FrameId = u64;
pub type ObjectId = u64;

pub type Result<T, E = RemoteError> = std::result::Result<T, E>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RemoteValue {
    Null,
    Void,
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    /// UTF-16 code unit, as carried on the wire.
    Char(u16),
    Object(ObjectRef),
}

impl RemoteValue {
    pub fn object(id: ObjectId, runtime_type: impl Into<String>) -> Self {
        Self::Object(ObjectRef::new(id, runtime_type))
    }

    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            Self::Object(obj) => Some(obj.id),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Declared type of a container element: its runtime type when it is an
    /// object, its primitive name otherwise, `fallback` for `null`.
    pub fn type_name_or(&self, fallback: &str) -> String {
        match self {
            Self::Object(obj) => obj.runtime_type.clone(),
            other => other.primitive_type_name().unwrap_or(fallback).to_string(),
        }
    }

    /// Name of the primitive type carried by this value (`None` for references).
    pub fn primitive_type_name(&self) -> Option<&'static str> {
        Some(match self {
            Self::Null | Self::Object(_) => return None,
            Self::Void => "void",
            Self::Boolean(_) => "boolean",
            Self::Byte(_) => "byte",
            Self::Short(_) => "short",
            Self::Int(_) => "int",
            Self::Long(_) => "long",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::Char(_) => "char",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub id: ObjectId,
    pub runtime_type: String,
}

impl ObjectRef {
    pub fn new(id: ObjectId, runtime_type: impl Into<String>) -> Self {
        Self {
            id,
            runtime_type: runtime_type.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@0x{:x}", self.runtime_type, self.id)
    }
}

/// One visible local variable of a stack frame.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalVariable {
    pub name: String,
    pub declared_type: String,
    pub value: RemoteValue,
}

/// One declared field of an object, together with its current value.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldValue {
    pub name: String,
    pub declared_type: String,
    pub is_static: bool,
    pub value: RemoteValue,
}

/// A child delivered by [`AsyncRemoteAccess::fetch_children`].
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteVariable {
    pub name: String,
    pub declared_type: String,
    pub value: RemoteValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrameInfo {
    pub id: FrameId,
    pub name: String,
    pub line: u32,
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("no local variable information available")]
    AbsentInformation,
    #[error("stack frame {0} is no longer valid")]
    InvalidFrame(FrameId),
    #[error("thread {0} is not suspended")]
    InvalidThreadState(ThreadId),
    #[error("invalid object id {0}")]
    InvalidObject(ObjectId),
    #[error("`{type_name}` has no method `{method}`")]
    NoSuchMethod { type_name: String, method: String },
    #[error("method invocation failed: {0}")]
    InvocationFailed(String),
    #[error("debuggee disconnected")]
    Disconnected,
    #[error("remote request was cancelled")]
    Cancelled,
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl RemoteError {
    /// Absent debug info is a recoverable condition (treated as "no locals").
    pub fn is_absent_information(&self) -> bool {
        matches!(self, Self::AbsentInformation)
    }
}

/// Reads that never run code on the debuggee.
///
/// Shared by the classifier and both explorers, and always valid on a
/// suspended thread (unlike frame reads).
pub trait ValueReader {
    /// All fields of the object's runtime type, instance and static.
    fn fields(&mut self, object: &ObjectRef) -> Result<Vec<FieldValue>>;

    fn string_value(&mut self, object: &ObjectRef) -> Result<String>;

    /// Every interface the runtime type implements, including inherited ones.
    fn interfaces(&mut self, object: &ObjectRef) -> Result<Vec<String>>;
}

/// Blocking remote access on a suspended debuggee.
///
/// Only one call is ever outstanding: the suspended thread is a serialized
/// resource. Once [`RemoteAccess::invoke_method`] has run on a thread, frame
/// reads for that thread ([`RemoteAccess::this_object`],
/// [`RemoteAccess::visible_variables`]) fail with [`RemoteError::InvalidFrame`].
pub trait RemoteAccess: ValueReader + Send {
    /// Frames of a suspended thread, innermost first.
    fn stack_frames(&mut self, thread: ThreadId) -> Result<Vec<StackFrameInfo>>;

    /// The frame's receiver, `None` for static methods.
    fn this_object(&mut self, frame: FrameId) -> Result<Option<ObjectRef>>;

    /// Fails with [`RemoteError::AbsentInformation`] when the class was
    /// compiled without a local variable table.
    fn visible_variables(&mut self, frame: FrameId) -> Result<Vec<LocalVariable>>;

    fn array_length(&mut self, array: &ObjectRef) -> Result<usize>;

    fn array_values(&mut self, array: &ObjectRef, first: usize, len: usize)
        -> Result<Vec<RemoteValue>>;

    fn invoke_method(
        &mut self,
        thread: ThreadId,
        receiver: &ObjectRef,
        method: &str,
        args: &[RemoteValue],
    ) -> Result<RemoteValue>;
}

/// Receives the children of one asynchronous request.
///
/// The host calls [`ChildSink::add_children`] one or more times, the last call
/// with `last == true`, or [`ChildSink::fail`] once.
pub trait ChildSink: Send {
    fn add_children(&mut self, children: Vec<RemoteVariable>, last: bool);

    fn fail(&mut self, error: RemoteError);
}

/// The host's non-blocking child resolution.
pub trait AsyncRemoteAccess: Send + Sync + 'static {
    fn fields(&self, object: &ObjectRef) -> Result<Vec<FieldValue>>;

    fn string_value(&self, object: &ObjectRef) -> Result<String>;

    /// Returns immediately; children are delivered to `sink` later, possibly
    /// from another thread.
    fn fetch_children(&self, object: &ObjectRef, sink: Box<dyn ChildSink>);
}
