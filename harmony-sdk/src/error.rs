use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("connect failed: {0}")]
    Connect(#[from] harmony_stream::ConnectError),

    #[error("request failed: {0}")]
    Request(#[from] harmony_stream::RequestError),

    #[error("protocol error: {0}")]
    Protocol(#[from] harmony_protocol::ProtocolError),

    #[error("hub returned error code {0}")]
    Hub(String),

    #[error("not connected to a hub")]
    NotConnected,

    #[error("activity not found: {0}")]
    ActivityNotFound(String),

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("device {device} has no command {command}")]
    CommandNotFound { device: String, command: String },
}
