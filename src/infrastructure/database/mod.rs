pub mod connection_pool;
pub mod portal_state_repository;
pub mod tracking_repository;

pub use connection_pool::ConnectionPool;
pub use portal_state_repository::PortalStateRepository;
pub use tracking_repository::TrackingRepository;
