//! # Data-Store Boundary
//!
//! The engine does not implement a data-store driver; it consumes one
//! through this contract. A factory is registered per driver name and the
//! engine builds one store per request on demand, closing it during
//! guaranteed cleanup.

use crate::config::StoreConfig;
use crate::error::Result;
use std::sync::Arc;

/// A per-request data-store handle owned by exactly one context
pub trait Store: Send {
    /// Name of the driver that produced this store
    fn driver(&self) -> &str;

    /// Release the underlying connection; called exactly once by the
    /// lifecycle wrapper after the handler chain finishes.
    fn close(&mut self) -> Result<()>;
}

/// Factory building a fresh store from the configured connection settings
pub type StoreFactory = Arc<dyn Fn(&StoreConfig) -> Result<Box<dyn Store>> + Send + Sync>;
