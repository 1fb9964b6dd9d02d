// Form engine: dependent selectors (country → state → city, major skill → skill),
// a step-gated wizard, and the single store both write through.
// All REST API access goes through api_client via the seams in sources.rs.

pub mod handlers;
pub mod hierarchy;
pub mod initializer;
pub mod loader;
pub mod models;
pub mod payload;
pub mod presets;
pub mod session;
pub mod skills;
pub mod sources;
pub mod store;
pub mod validation;
pub mod wizard;
