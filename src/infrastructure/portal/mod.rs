pub mod http_portal;
pub mod snapshot_dir;

pub use http_portal::HttpPortal;
pub use snapshot_dir::SnapshotDir;
