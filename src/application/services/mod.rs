pub mod catalog;
pub mod change_detector;
pub mod orphan_resolver;
pub mod pipeline;
pub mod reconciler;
pub mod relationship_linker;
pub mod reverse_sync;

#[cfg(test)]
pub(crate) mod testing;

pub use orphan_resolver::OrphanResolver;
pub use pipeline::{RemoteTargets, RunOptions, SyncPipeline};
pub use reconciler::Reconciler;
pub use relationship_linker::RelationshipLinker;
pub use reverse_sync::{PortalBaseline, ReverseSyncEngine};
