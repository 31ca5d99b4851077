//! HTTP request handlers, grouped by domain:
//! - `common` - response envelope and query structs
//! - `health` - service liveness
//! - `runs` - run history and manual triggers
//! - `operations` - run lease inspection and release

pub mod common;
pub mod health;
pub mod operations;
pub mod runs;

pub use health::*;
pub use operations::*;
pub use runs::*;
