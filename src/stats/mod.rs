pub mod registry;
pub mod stream;
pub mod view;

pub use registry::{Harvest, RegistryBuilder, RegistryError, ViewRegistry};
pub use view::{ViewFilter, ViewSnapshot, ViewSpec};

/// Name of the view that is always registered and matches every event.
pub const TOTAL_VIEW: &str = "total";

/// One decoded performance sample from an application instance.
/// This is the "write" side: the receiver decodes these and folds them in.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEvent {
    /// Host the request was served on
    pub hostname: String,
    /// Virtual host / server name
    pub server_name: String,
    /// Script path, e.g. "/index.php"
    pub script_name: String,
    /// Wall time of the request in seconds
    pub request_time: f64,
    /// User CPU seconds
    pub ru_utime: f64,
    /// System CPU seconds
    pub ru_stime: f64,
    /// Response body size in bytes
    pub document_size: u64,
    /// Peak memory usage in bytes
    pub memory_peak: u64,
}
