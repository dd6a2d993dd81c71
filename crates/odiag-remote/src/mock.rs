use std::collections::{BTreeSet, HashMap};

use crate::heap::{MockHeap, MockObjectKind};
use crate::{
    FieldValue, FrameId, LocalVariable, ObjectId, ObjectRef, RemoteAccess, RemoteError,
    RemoteValue, Result, StackFrameInfo, ThreadId, ValueReader,
};

/// Ids handed out for iterators and entry sets created by `invoke_method`.
const SYNTHETIC_ID_BASE: ObjectId = 1 << 48;

/// A method call observed by [`MockRemote`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub thread: ThreadId,
    pub receiver: ObjectId,
    pub method: String,
}

#[derive(Debug)]
enum Synthetic {
    EntrySet { entries: Vec<RemoteValue> },
    Iterator { items: Vec<RemoteValue>, pos: usize },
}

/// Deterministic, in-memory [`RemoteAccess`] test double.
///
/// Frame reads on a thread fail with [`RemoteError::InvalidFrame`] once any
/// method has been invoked on that thread, until [`MockRemote::suspend`] marks
/// a fresh stop.
pub struct MockRemote {
    heap: MockHeap,
    synthetic: HashMap<ObjectId, Synthetic>,
    next_synthetic: ObjectId,
    frames_invalidated: BTreeSet<ThreadId>,
    running: BTreeSet<ThreadId>,
    failing_objects: BTreeSet<ObjectId>,
    disconnected: bool,
    invocations: Vec<Invocation>,
    frame_reads: usize,
}

impl MockRemote {
    pub fn new(heap: MockHeap) -> Self {
        Self {
            heap,
            synthetic: HashMap::new(),
            next_synthetic: SYNTHETIC_ID_BASE,
            frames_invalidated: BTreeSet::new(),
            running: BTreeSet::new(),
            failing_objects: BTreeSet::new(),
            disconnected: false,
            invocations: Vec::new(),
            frame_reads: 0,
        }
    }

    pub fn heap(&self) -> &MockHeap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut MockHeap {
        &mut self.heap
    }

    /// Every read or invocation touching `id` fails with [`RemoteError::InvalidObject`].
    pub fn fail_object(&mut self, id: ObjectId) {
        self.failing_objects.insert(id);
    }

    /// Every later call fails with [`RemoteError::Disconnected`].
    pub fn disconnect(&mut self) {
        self.disconnected = true;
    }

    /// Models the thread running again; its frames and invocations become invalid.
    pub fn resume(&mut self, thread: ThreadId) {
        self.running.insert(thread);
        self.frames_invalidated.insert(thread);
    }

    /// Models a new stop: frames are readable again and iterators are dropped.
    pub fn suspend(&mut self, thread: ThreadId) {
        self.running.remove(&thread);
        self.frames_invalidated.remove(&thread);
        self.synthetic.clear();
    }

    pub fn invocations(&self) -> &[Invocation] {
        &self.invocations
    }

    /// Number of successful `this_object`/`visible_variables` reads.
    pub fn frame_reads(&self) -> usize {
        self.frame_reads
    }

    fn check_connected(&self) -> Result<()> {
        if self.disconnected {
            Err(RemoteError::Disconnected)
        } else {
            Ok(())
        }
    }

    fn check_object(&self, id: ObjectId) -> Result<()> {
        self.check_connected()?;
        if self.failing_objects.contains(&id) {
            return Err(RemoteError::InvalidObject(id));
        }
        Ok(())
    }

    fn check_frame(&self, frame: FrameId) -> Result<ThreadId> {
        self.check_connected()?;
        let (thread, _) = self
            .heap
            .frame(frame)
            .ok_or(RemoteError::InvalidFrame(frame))?;
        if self.running.contains(&thread) || self.frames_invalidated.contains(&thread) {
            return Err(RemoteError::InvalidFrame(frame));
        }
        Ok(thread)
    }

    fn alloc_synthetic(&mut self, synthetic: Synthetic) -> ObjectId {
        let id = self.next_synthetic;
        self.next_synthetic += 1;
        self.synthetic.insert(id, synthetic);
        id
    }

    fn iterator_over(&mut self, items: Vec<RemoteValue>) -> RemoteValue {
        let id = self.alloc_synthetic(Synthetic::Iterator { items, pos: 0 });
        RemoteValue::object(id, "java.util.Iterator")
    }

    fn invoke_synthetic(&mut self, receiver: &ObjectRef, method: &str) -> Result<RemoteValue> {
        let no_such_method = || RemoteError::NoSuchMethod {
            type_name: receiver.runtime_type.clone(),
            method: method.to_string(),
        };
        let entries = match self.synthetic.get_mut(&receiver.id) {
            Some(Synthetic::EntrySet { entries }) if method == "iterator" => entries.clone(),
            Some(Synthetic::Iterator { items, pos }) => {
                return match method {
                    "hasNext" => Ok(RemoteValue::Boolean(*pos < items.len())),
                    "next" => {
                        let item = items.get(*pos).cloned().ok_or_else(|| {
                            RemoteError::InvocationFailed(
                                "java.util.NoSuchElementException".to_string(),
                            )
                        })?;
                        *pos += 1;
                        Ok(item)
                    }
                    _ => Err(no_such_method()),
                };
            }
            _ => return Err(no_such_method()),
        };
        Ok(self.iterator_over(entries))
    }
}

impl ValueReader for MockRemote {
    fn fields(&mut self, object: &ObjectRef) -> Result<Vec<FieldValue>> {
        self.check_object(object.id)?;
        if self.synthetic.contains_key(&object.id) {
            return Ok(Vec::new());
        }
        self.heap.fields(object.id)
    }

    fn string_value(&mut self, object: &ObjectRef) -> Result<String> {
        self.check_object(object.id)?;
        self.heap.string_value(object.id)
    }

    fn interfaces(&mut self, object: &ObjectRef) -> Result<Vec<String>> {
        self.check_object(object.id)?;
        if self.synthetic.contains_key(&object.id) {
            return Ok(vec!["java.util.Iterator".to_string()]);
        }
        Ok(self.heap.object(object.id)?.interfaces.clone())
    }
}

impl RemoteAccess for MockRemote {
    fn stack_frames(&mut self, thread: ThreadId) -> Result<Vec<StackFrameInfo>> {
        self.check_connected()?;
        if self.running.contains(&thread) {
            return Err(RemoteError::InvalidThreadState(thread));
        }
        self.heap.stack_frames(thread)
    }

    fn this_object(&mut self, frame: FrameId) -> Result<Option<ObjectRef>> {
        self.check_frame(frame)?;
        let this = self
            .heap
            .frame(frame)
            .and_then(|(_, f)| f.this)
            .map(|id| self.heap.object_ref(id))
            .transpose()?;
        self.frame_reads += 1;
        Ok(this)
    }

    fn visible_variables(&mut self, frame: FrameId) -> Result<Vec<LocalVariable>> {
        self.check_frame(frame)?;
        let locals = self
            .heap
            .frame(frame)
            .and_then(|(_, f)| f.locals.clone())
            .ok_or(RemoteError::AbsentInformation)?;
        self.frame_reads += 1;
        Ok(locals
            .into_iter()
            .map(|l| LocalVariable {
                name: l.name,
                declared_type: l.declared_type,
                value: l.value,
            })
            .collect())
    }

    fn array_length(&mut self, array: &ObjectRef) -> Result<usize> {
        self.check_object(array.id)?;
        match &self.heap.object(array.id)?.kind {
            MockObjectKind::Array { elements } => Ok(elements.len()),
            _ => Err(RemoteError::Protocol(format!("object {} is not an array", array.id))),
        }
    }

    fn array_values(
        &mut self,
        array: &ObjectRef,
        first: usize,
        len: usize,
    ) -> Result<Vec<RemoteValue>> {
        self.check_object(array.id)?;
        match &self.heap.object(array.id)?.kind {
            MockObjectKind::Array { elements } => first
                .checked_add(len)
                .and_then(|end| elements.get(first..end))
                .map(<[RemoteValue]>::to_vec)
                .ok_or_else(|| {
                    RemoteError::Protocol(format!(
                        "array index out of bounds: {first}+{len} > {}",
                        elements.len()
                    ))
                }),
            _ => Err(RemoteError::Protocol(format!("object {} is not an array", array.id))),
        }
    }

    fn invoke_method(
        &mut self,
        thread: ThreadId,
        receiver: &ObjectRef,
        method: &str,
        args: &[RemoteValue],
    ) -> Result<RemoteValue> {
        self.check_object(receiver.id)?;
        if self.running.contains(&thread) || !self.heap.threads.contains_key(&thread) {
            return Err(RemoteError::InvalidThreadState(thread));
        }
        if !args.is_empty() {
            return Err(RemoteError::InvocationFailed(format!(
                "mock only supports zero-argument methods, got {} arguments for `{method}`",
                args.len()
            )));
        }

        // Running code on the thread invalidates its frames, even if the call fails.
        self.frames_invalidated.insert(thread);
        self.invocations.push(Invocation {
            thread,
            receiver: receiver.id,
            method: method.to_string(),
        });
        tracing::trace!(target: "odiag.remote", thread, receiver = %receiver, method, "invoke");

        if self.synthetic.contains_key(&receiver.id) {
            return self.invoke_synthetic(receiver, method);
        }

        let kind = self.heap.object(receiver.id)?.kind.clone();
        match (kind, method) {
            (MockObjectKind::Collection { elements }, "iterator") => Ok(self.iterator_over(elements)),
            (MockObjectKind::Map { entries }, "entrySet") => {
                let entries = entries.iter().map(|id| self.heap.value(*id)).collect();
                let id = self.alloc_synthetic(Synthetic::EntrySet { entries });
                Ok(RemoteValue::object(id, "java.util.HashMap$EntrySet"))
            }
            (MockObjectKind::MapEntry { key, .. }, "getKey") => Ok(key),
            (MockObjectKind::MapEntry { value, .. }, "getValue") => Ok(value),
            _ => Err(RemoteError::NoSuchMethod {
                type_name: receiver.runtime_type.clone(),
                method: method.to_string(),
            }),
        }
    }
}
