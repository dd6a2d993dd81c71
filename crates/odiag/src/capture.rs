//! Root capture: reads `this` and the visible locals of a frame before
//! anything runs on the suspended thread.

use std::collections::BTreeMap;

use odiag_remote::{FrameId, ObjectId, ObjectRef, RemoteAccess, StackFrameInfo, ThreadId};

use crate::classify::{classify_shallow, ValueKind};
use crate::diagram::PrimitiveRootValue;
use crate::error::CaptureError;

pub const THIS: &str = "this";

/// An object root waiting for expansion.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingRoot {
    pub name: String,
    pub declared_type: String,
    pub object: ObjectRef,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CapturedRoots {
    pub primitives: Vec<PrimitiveRootValue>,
    /// Expanded in ascending id order.
    pub pending: BTreeMap<ObjectId, PendingRoot>,
}

impl CapturedRoots {
    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty() && self.pending.is_empty()
    }

    /// Names of every captured root, scalar or object.
    pub fn names(&self) -> Vec<&str> {
        self.primitives
            .iter()
            .map(|root| root.name.as_str())
            .chain(self.pending.values().map(|root| root.name.as_str()))
            .collect()
    }

    fn push_object(&mut self, name: &str, declared_type: &str, object: ObjectRef) {
        let root = PendingRoot {
            name: name.to_string(),
            declared_type: declared_type.to_string(),
            object,
        };
        if let Some(previous) = self.pending.insert(root.object.id, root) {
            tracing::debug!(
                target: "odiag.capture",
                object = previous.object.id,
                replaced = %previous.name,
                "root reachable through several variables; keeping the later name"
            );
        }
    }
}

/// The innermost frame of a suspended thread.
pub fn top_frame<R>(remote: &mut R, thread: ThreadId) -> Result<StackFrameInfo, CaptureError>
where
    R: RemoteAccess + ?Sized,
{
    remote
        .stack_frames(thread)?
        .into_iter()
        .next()
        .ok_or(CaptureError::NoFrame(thread))
}

/// Snapshots the frame's roots. Performs no method invocation, so it must run
/// before either explorer touches the thread.
pub fn capture_roots<R>(
    remote: &mut R,
    frame: FrameId,
    thread: ThreadId,
) -> Result<CapturedRoots, CaptureError>
where
    R: RemoteAccess + ?Sized,
{
    let mut roots = CapturedRoots::default();

    if let Some(this) = remote.this_object(frame)? {
        let declared_type = this.runtime_type.clone();
        roots.push_object(THIS, &declared_type, this);
    }

    let locals = match remote.visible_variables(frame) {
        Ok(locals) => locals,
        Err(err) if err.is_absent_information() => {
            tracing::debug!(target: "odiag.capture", frame, thread, "no local variable table; capturing `this` only");
            Vec::new()
        }
        Err(err) => return Err(err.into()),
    };

    for local in locals {
        let kind = classify_shallow(remote, &local.value)?;
        if let Some(text) = kind.scalar_text() {
            roots
                .primitives
                .push(PrimitiveRootValue::new(local.name, local.declared_type, text));
            continue;
        }
        if let ValueKind::PlainObject(object) = kind {
            roots.push_object(&local.name, &local.declared_type, object);
        }
    }

    tracing::debug!(
        target: "odiag.capture",
        frame,
        thread,
        primitives = roots.primitives.len(),
        objects = roots.pending.len(),
        "captured roots"
    );
    Ok(roots)
}
