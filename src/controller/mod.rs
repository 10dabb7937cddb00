pub mod catalog;
pub mod clock;
pub mod debounce;
pub mod error;
pub mod lifecycle;
pub mod persistence;
pub mod results;
pub mod segments;
pub mod store;

pub use error::EngineError;
pub use lifecycle::LifecycleController;
pub use persistence::{ArchiveOptions, BackendError, ExperimentBackend, HttpBackend, Scope};
pub use results::ResultsProjection;
pub use store::ExperimentStore;
