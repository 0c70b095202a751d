pub mod admission;
pub mod bucket;
pub mod config;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod logging;
pub mod metrics;
pub mod session;
pub mod state;
pub mod sweeper;

pub use admission::{AdmissionController, AdmissionLayer, AdmissionService, Admitted};
pub use bucket::{Acquire, Bucket};
pub use config::LimiterConfig;
pub use error::{ConfigError, RateLimited};
pub use identity::IdentitySource;
pub use session::{ClientIdentity, SessionStore};
