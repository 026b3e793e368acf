//! Types library for the order book replication service
//!
//! Shared type definitions used by the replication engine and its
//! collaborators, ensuring prices and sizes never pass through binary
//! floating point.
//!
//! # Modules
//! - `ids`: Identifiers (Symbol, ConsumerId)
//! - `numeric`: Fixed-point decimal types (Price, Size)
//! - `side`: Book side (bid or ask)
//! - `topic`: Subscription units (Depth, Topic)
//! - `errors`: Error taxonomy

// Public modules
pub mod ids;
pub mod numeric;
pub mod side;
pub mod topic;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ids::*;
    pub use crate::numeric::*;
    pub use crate::side::*;
    pub use crate::topic::*;
    pub use crate::errors::*;
}
