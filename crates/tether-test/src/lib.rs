//! Shared test doubles for the Tether plugin host.
//!
//! Add as a dev-dependency and build a manager over mocks:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tether_test::{MockInstaller, MockLoader, TestRoot, test_manager};
//!
//! let root = TestRoot::new();
//! let loader = Arc::new(MockLoader::new());
//! let installer = Arc::new(MockInstaller::new());
//! let manager = test_manager(root.path(), &loader, &installer);
//! assert!(manager.list(&[]).is_empty());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod fixtures;
pub mod harness;
pub mod mocks;

pub use fixtures::*;
pub use harness::*;
pub use mocks::*;
