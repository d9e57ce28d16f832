// Gantry Infrastructure - HTTP Adapter
// Client side of the sibling control-plane job-listing API, used by
// dependency resolution to look up jobs this deployment does not own.

mod resource_manager;

pub use resource_manager::HttpResourceManager;
