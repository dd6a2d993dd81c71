use std::collections::HashSet;

use odiag_config::{NestedContainers, SharedReferences};
use odiag_remote::{ObjectId, ObjectRef, RemoteAccess, RemoteError, RemoteValue, ThreadId};
use tokio_util::sync::CancellationToken;

use crate::capture::CapturedRoots;
use crate::classify::{classify, ValueKind};
use crate::diagram::Diagram;
use crate::error::{ExploreError, Result};
use crate::explore::ExploreOptions;

pub const KEY: &str = "key";
pub const VALUE: &str = "value";

const OBJECT_TYPE: &str = "java.lang.Object";

/// State owned by exactly one snapshot.
#[derive(Debug, Default)]
struct ExploreContext {
    diagram: Diagram,
    /// Plain objects and containers already emitted (or inlined).
    visited: HashSet<ObjectId>,
}

/// The node a converted value hangs from and the role of the link to it.
#[derive(Clone, Debug)]
struct Owner {
    id: ObjectId,
    role: String,
}

impl Owner {
    fn new(id: ObjectId, role: impl Into<String>) -> Self {
        Self {
            id,
            role: role.into(),
        }
    }
}

/// Node receiving a container's elements.
struct ContainerTarget {
    id: ObjectId,
    /// Set when the owner stands in for the container.
    inline_role: Option<String>,
}

impl ContainerTarget {
    fn element_role(&self, index: usize) -> String {
        match &self.inline_role {
            Some(role) => role.clone(),
            None => index.to_string(),
        }
    }

    fn entry_role(&self, index: usize) -> String {
        match &self.inline_role {
            Some(role) => format!("{index}{role}"),
            None => index.to_string(),
        }
    }
}

/// A value waiting for conversion.
#[derive(Debug)]
struct PendingValue {
    value: RemoteValue,
    name: String,
    declared_type: String,
    owner: Option<Owner>,
}

impl PendingValue {
    fn new(
        value: RemoteValue,
        name: impl Into<String>,
        declared_type: impl Into<String>,
        owner: Option<Owner>,
    ) -> Self {
        Self {
            value,
            name: name.into(),
            declared_type: declared_type.into(),
            owner,
        }
    }
}

/// A map entry read from the remote, emitted when popped.
#[derive(Debug)]
struct PendingEntry {
    entry: ObjectRef,
    key: RemoteValue,
    value: RemoteValue,
    /// Node and role the entry hangs from.
    owner: Owner,
    index: usize,
}

#[derive(Debug)]
enum Work {
    Value(PendingValue),
    Entry(PendingEntry),
}

/// Depth-first work list. Children are pushed in reverse so they pop in
/// declaration order and the walk keeps preorder.
type WorkStack = Vec<Work>;

/// Walks the full reachable graph with blocking, strictly sequential remote
/// calls on one suspended thread.
///
/// Collections and maps are enumerated by invoking `iterator`, `hasNext`,
/// `next`, `entrySet`, `getKey` and `getValue`, so roots must be captured
/// (see [`crate::capture::capture_roots`]) before [`SyncExplorer::explore`].
/// Traversal runs off an explicit work stack; graph depth never grows the
/// call stack.
pub struct SyncExplorer<'r, R: RemoteAccess + ?Sized> {
    remote: &'r mut R,
    thread: ThreadId,
    options: ExploreOptions,
    cancel: Option<CancellationToken>,
    context: ExploreContext,
}

impl<'r, R: RemoteAccess + ?Sized> SyncExplorer<'r, R> {
    pub fn new(remote: &'r mut R, thread: ThreadId, options: ExploreOptions) -> Self {
        Self {
            remote,
            thread,
            options,
            cancel: None,
            context: ExploreContext::default(),
        }
    }

    /// Checked before every remote call; a cancelled exploration stops with
    /// [`ExploreError::Cancelled`].
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn explore(mut self, captured: CapturedRoots) -> Result<Diagram> {
        let CapturedRoots {
            primitives,
            pending,
        } = captured;
        for root in primitives {
            self.context.diagram.insert_primitive_root_value(root);
        }

        for root in pending.into_values() {
            let start = PendingValue::new(
                RemoteValue::Object(root.object),
                root.name.as_str(),
                root.declared_type,
                None,
            );
            if let Err(err) = self.drain(start) {
                tracing::warn!(
                    target: "odiag.explore",
                    thread = self.thread,
                    root = %root.name,
                    error = %err,
                    "synchronous exploration aborted"
                );
                return Err(err);
            }
        }

        let diagram = self.context.diagram;
        tracing::debug!(
            target: "odiag.explore",
            thread = self.thread,
            objects = diagram.objects().len(),
            links = diagram.links().len(),
            "synchronous exploration finished"
        );
        Ok(diagram)
    }

    /// Converts one root and everything reachable from it.
    fn drain(&mut self, root: PendingValue) -> Result<()> {
        let mut stack = vec![Work::Value(root)];
        while let Some(work) = stack.pop() {
            match work {
                Work::Value(pending) => self.convert_value(pending, &mut stack)?,
                Work::Entry(entry) => self.emit_entry(entry, &mut stack),
            }
        }
        Ok(())
    }

    fn convert_value(&mut self, pending: PendingValue, stack: &mut WorkStack) -> Result<()> {
        self.check_cancelled()?;
        let PendingValue {
            value,
            name,
            declared_type,
            owner,
        } = pending;
        match classify(&mut *self.remote, &value)? {
            ValueKind::Array(array) => self.convert_array(&array, &name, owner.as_ref(), stack),
            ValueKind::Collection(collection) => {
                self.convert_collection(&collection, &name, owner.as_ref(), stack)
            }
            ValueKind::Map(map) => self.convert_map(&map, &name, owner.as_ref(), stack),
            ValueKind::PlainObject(object) => {
                self.convert_object(&object, &name, owner.as_ref(), stack)
            }
            scalar => {
                if let Some(text) = scalar.scalar_text() {
                    self.attach_scalar(&name, &declared_type, text, owner.as_ref());
                }
                Ok(())
            }
        }
    }

    fn attach_scalar(
        &mut self,
        name: &str,
        declared_type: &str,
        text: String,
        owner: Option<&Owner>,
    ) {
        let diagram = &mut self.context.diagram;
        match owner {
            Some(owner) => {
                diagram.add_attribute(owner.id, name, declared_type, text);
            }
            None => {
                diagram.add_primitive_root_value(name, declared_type, text);
            }
        }
    }

    fn convert_object(
        &mut self,
        object: &ObjectRef,
        name: &str,
        owner: Option<&Owner>,
        stack: &mut WorkStack,
    ) -> Result<()> {
        if !self.context.visited.insert(object.id) {
            if let Some(owner) = owner {
                self.link_shared(owner, object.id);
            }
            return Ok(());
        }

        self.context
            .diagram
            .add_object(object.id, object.runtime_type.as_str(), name);
        if let Some(owner) = owner {
            self.context
                .diagram
                .add_link(owner.id, object.id, owner.role.as_str());
        }

        self.check_cancelled()?;
        let fields = self.remote.fields(object)?;
        stack.extend(fields.into_iter().rev().map(|field| {
            let owner = Owner::new(object.id, field.name.as_str());
            Work::Value(PendingValue::new(field.value, field.name, field.declared_type, Some(owner)))
        }));
        Ok(())
    }

    /// Second path to an already emitted node.
    fn link_shared(&mut self, owner: &Owner, target: ObjectId) {
        if self.options.shared_references == SharedReferences::LinkExisting
            && self.context.diagram.contains_object(target)
        {
            self.context
                .diagram
                .add_link(owner.id, target, owner.role.as_str());
        }
    }

    /// Emits (or, inline, borrows) the node a container's elements attach to.
    /// `None` when the container was already handled.
    fn open_container(
        &mut self,
        container: &ObjectRef,
        name: &str,
        owner: Option<&Owner>,
    ) -> Option<ContainerTarget> {
        if !self.context.visited.insert(container.id) {
            if let Some(owner) = owner {
                self.link_shared(owner, container.id);
            }
            return None;
        }

        match (owner, self.options.nested_containers) {
            (Some(owner), NestedContainers::Inline) => Some(ContainerTarget {
                id: owner.id,
                inline_role: Some(owner.role.clone()),
            }),
            (owner, _) => {
                let diagram = &mut self.context.diagram;
                diagram.add_object(container.id, container.runtime_type.as_str(), name);
                if let Some(owner) = owner {
                    diagram.add_link(owner.id, container.id, owner.role.as_str());
                }
                Some(ContainerTarget {
                    id: container.id,
                    inline_role: None,
                })
            }
        }
    }

    /// Queues container elements so they convert in index order.
    fn push_elements(
        target: &ContainerTarget,
        elements: Vec<(RemoteValue, String)>,
        stack: &mut WorkStack,
    ) {
        let queued = elements.into_iter().enumerate().rev();
        stack.extend(queued.map(|(index, (value, declared_type))| {
            let owner = Owner::new(target.id, target.element_role(index));
            Work::Value(PendingValue::new(value, index.to_string(), declared_type, Some(owner)))
        }));
    }

    fn convert_array(
        &mut self,
        array: &ObjectRef,
        name: &str,
        owner: Option<&Owner>,
        stack: &mut WorkStack,
    ) -> Result<()> {
        let Some(target) = self.open_container(array, name, owner) else {
            return Ok(());
        };

        self.check_cancelled()?;
        let length = self.remote.array_length(array)?;
        let values = if length == 0 {
            Vec::new()
        } else {
            self.remote.array_values(array, 0, length)?
        };
        let element_type = array.runtime_type.strip_suffix("[]").unwrap_or(OBJECT_TYPE);

        let elements = values
            .into_iter()
            .map(|value| {
                let declared_type = value.type_name_or(element_type);
                (value, declared_type)
            })
            .collect();
        Self::push_elements(&target, elements, stack);
        Ok(())
    }

    fn convert_collection(
        &mut self,
        collection: &ObjectRef,
        name: &str,
        owner: Option<&Owner>,
        stack: &mut WorkStack,
    ) -> Result<()> {
        let Some(target) = self.open_container(collection, name, owner) else {
            return Ok(());
        };

        // The iterator is exhausted before any element is converted.
        let iterator = self.invoke_object(collection, "iterator")?;
        let mut elements = Vec::new();
        while self.invoke_bool(&iterator, "hasNext")? {
            let element = self.invoke(&iterator, "next")?;
            let declared_type = element.type_name_or(OBJECT_TYPE);
            elements.push((element, declared_type));
        }
        Self::push_elements(&target, elements, stack);
        Ok(())
    }

    fn convert_map(
        &mut self,
        map: &ObjectRef,
        name: &str,
        owner: Option<&Owner>,
        stack: &mut WorkStack,
    ) -> Result<()> {
        let Some(target) = self.open_container(map, name, owner) else {
            return Ok(());
        };

        let entry_set = self.invoke_object(map, "entrySet")?;
        let iterator = self.invoke_object(&entry_set, "iterator")?;
        let mut entries = Vec::new();
        while self.invoke_bool(&iterator, "hasNext")? {
            let entry = self.invoke_object(&iterator, "next")?;
            let key = self.invoke(&entry, "getKey")?;
            let value = self.invoke(&entry, "getValue")?;
            let index = entries.len();
            entries.push(PendingEntry {
                entry,
                key,
                value,
                owner: Owner::new(target.id, target.entry_role(index)),
                index,
            });
        }
        stack.extend(entries.into_iter().rev().map(Work::Entry));
        Ok(())
    }

    /// Entry nodes are never shared, so they bypass the visited set.
    fn emit_entry(&mut self, pending: PendingEntry, stack: &mut WorkStack) {
        let PendingEntry {
            entry,
            key,
            value,
            owner,
            index,
        } = pending;
        let diagram = &mut self.context.diagram;
        diagram.add_object(entry.id, entry.runtime_type.as_str(), index.to_string());
        diagram.add_link(owner.id, entry.id, owner.role);

        let key_type = key.type_name_or(OBJECT_TYPE);
        let value_type = value.type_name_or(OBJECT_TYPE);
        stack.push(Work::Value(PendingValue::new(
            value,
            VALUE,
            value_type,
            Some(Owner::new(entry.id, VALUE)),
        )));
        stack.push(Work::Value(PendingValue::new(
            key,
            KEY,
            key_type,
            Some(Owner::new(entry.id, KEY)),
        )));
    }

    fn invoke(&mut self, receiver: &ObjectRef, method: &str) -> Result<RemoteValue> {
        self.check_cancelled()?;
        tracing::trace!(target: "odiag.remote", thread = self.thread, receiver = %receiver, method, "invoke");
        Ok(self
            .remote
            .invoke_method(self.thread, receiver, method, &[])?)
    }

    fn invoke_object(&mut self, receiver: &ObjectRef, method: &str) -> Result<ObjectRef> {
        match self.invoke(receiver, method)? {
            RemoteValue::Object(object) => Ok(object),
            other => Err(unexpected_result(receiver, method, &other)),
        }
    }

    fn invoke_bool(&mut self, receiver: &ObjectRef, method: &str) -> Result<bool> {
        match self.invoke(receiver, method)? {
            RemoteValue::Boolean(value) => Ok(value),
            other => Err(unexpected_result(receiver, method, &other)),
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        match &self.cancel {
            Some(cancel) if cancel.is_cancelled() => Err(ExploreError::Cancelled),
            _ => Ok(()),
        }
    }
}

fn unexpected_result(receiver: &ObjectRef, method: &str, value: &RemoteValue) -> ExploreError {
    RemoteError::InvocationFailed(format!("`{method}` on {receiver} returned {value:?}")).into()
}
