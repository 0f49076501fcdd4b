//! Safe SQL builder: identifiers from the static schema only, values as typed parameters.

mod builder;
pub mod params;
pub use builder::*;
pub use params::*;
