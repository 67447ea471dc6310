use thiserror::Error;

/// Failures decoding or encoding a wire message.  Never fatal to the node.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("serialisation error: {0}")]
    Serialisation(#[from] bincode::Error),
}

/// Errors that stop a running [`crate::Node`].  Only transport failures end
/// up here; everything a peer can send is logged and dropped instead.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
