//! Object-diagram engine.
//!
//! On a suspend event the engine captures the innermost frame's roots
//! ([`capture`]), expands them with one of two explorers ([`explore`]) and
//! hands the finished [`Diagram`] to a [`DiagramSink`] ([`snapshot`]).
//!
//! The remote side is consumed through the traits of [`odiag_remote`].

pub mod capture;
pub mod classify;
pub mod diagram;
pub mod error;
pub mod explore;
pub mod pending;
pub mod snapshot;

pub use capture::{capture_roots, top_frame, CapturedRoots, PendingRoot};
pub use classify::{classify, classify_scalar, classify_shallow, Primitive, ValueKind};
pub use diagram::{AttributeValue, Diagram, DiagramNode, Link, PrimitiveRootValue};
pub use error::{CaptureError, ExploreError, Result, SnapshotError};
pub use explore::{AsyncExplorer, AsyncSnapshot, ExploreOptions, SyncExplorer};
pub use pending::{PendingOps, PendingStats, PendingToken};
pub use snapshot::{DiagramSink, JsonSink, MemorySink, SnapshotController, SnapshotOutcome};

pub use odiag_config::{ExplorerMode, NestedContainers, OdiagConfig, SharedReferences};
