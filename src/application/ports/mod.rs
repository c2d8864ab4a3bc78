pub mod member_portal;
pub mod remote_collection;
pub mod snapshot_source;

pub use member_portal::MemberPortal;
pub use remote_collection::{list_all, RemoteCollection, RemoteObject};
pub use snapshot_source::SnapshotSource;
