use tracing::debug;

use crate::{peers::PeerAddress, protocol::Token};

/// Hook for `APP_DEFINED` messages.
///
/// Returning `Some(payload)` makes the node answer the sender with an
/// `APP_DEFINED` message carrying `payload` and the request's token.
/// Closures with the same signature implement this trait.
pub trait AppHandler: Send {
    fn handle(
        &mut self,
        sender: PeerAddress,
        token: Option<Token>,
        payload: &[u8],
    ) -> Option<Vec<u8>>;
}

/// Default handler: logs the message and never replies.
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreAppMessages;

impl AppHandler for IgnoreAppMessages {
    fn handle(
        &mut self,
        sender: PeerAddress,
        _token: Option<Token>,
        payload: &[u8],
    ) -> Option<Vec<u8>> {
        debug!("Ignoring {}-byte app message from {sender}", payload.len());
        None
    }
}

impl<F> AppHandler for F
where
    F: FnMut(PeerAddress, Option<Token>, &[u8]) -> Option<Vec<u8>> + Send,
{
    fn handle(
        &mut self,
        sender: PeerAddress,
        token: Option<Token>,
        payload: &[u8],
    ) -> Option<Vec<u8>> {
        self(sender, token, payload)
    }
}
