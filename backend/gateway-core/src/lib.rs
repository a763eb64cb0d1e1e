pub mod cache;
pub mod config;
pub mod error;
pub mod identity;
pub mod instance;
pub mod jid;
pub mod notify;
pub mod protocol;
pub mod qr;
pub mod registry;
pub mod retry;

#[cfg(test)]
mod tests;

pub use instance::{ConnectionStatus, Instance, InstanceDeps, InstanceSummary};
pub use registry::Registry;

/// Directory entry marking the data dir as tracked; never an instance.
pub const DATA_DIR_SENTINEL: &str = ".gitkeep";
/// Subdirectory of the data dir holding per-instance webhook configs.
pub const WEBHOOK_CONFIG_DIR: &str = "webhooks";
/// Browser version advertised in the session identity triple.
pub const BROWSER_VERSION: &str = "10.0";
/// Close reason sent when an instance exhausts its QR budget.
pub const QR_LIMIT_REASON: &str = "QR code limit reached, please login again";
