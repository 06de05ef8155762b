//! Deployment orchestration

pub mod distribute;
pub mod orchestrator;
pub mod report;

pub use distribute::{Distributor, RsyncDistributor};
pub use orchestrator::Deployer;
pub use report::{DeploymentReport, HostOutcome};
