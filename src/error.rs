use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("malformed frame: {0}")]
    Frame(String),

    #[error("service discovery error: {0}")]
    Discovery(#[from] mdns_sd::Error),
}

impl RemoteError {
    pub fn frame(msg: impl Into<String>) -> Self {
        RemoteError::Frame(msg.into())
    }
}
