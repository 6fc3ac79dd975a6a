//! fsx-lifecycle - provisioning and idle reaping for ephemeral filesystems
//!
//! Two entry points share one set of service clients:
//!
//! - **Provisioner**: creates a filesystem for a team's bucket, reports its
//!   status and deletes it on request
//! - **Reaper**: one scheduled pass that deletes managed filesystems which
//!   have been idle past their grace period, notifies about each deletion,
//!   and switches its own schedule off once nothing is left to watch
//!
//! Remote services sit behind the traits in [`services`]; the `aws` feature
//! provides the real adapters and [`services::mock`] the in-memory ones.

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod provisioner;
pub mod reaper;
pub mod services;
pub mod trigger;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{Args, Command, ProvisionerSettings, ReaperSettings};
pub use error::{LifecycleError, Result};
pub use provisioner::{Provisioner, ProvisionerRequest, ProvisionerResponse};
pub use reaper::{PassOutcome, PassReport, Reaper};
pub use services::Services;
