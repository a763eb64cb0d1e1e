pub mod config;
pub mod instance;
pub mod notify;
pub mod protocol;

pub use config::ConfigError;
pub use instance::InstanceError;
pub use notify::NotifyError;
pub use protocol::ProtocolError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Instance(#[from] InstanceError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
