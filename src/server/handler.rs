//! Relay handler hooks
//!
//! Applications embed the relay by implementing `RelayHandler`. Every method
//! has a default, so an empty impl (or `()`) relays everything.

use std::future::Future;

use crate::registry::RelayFrame;
use crate::session::SessionContext;

/// Callbacks invoked by the lifecycle dispatcher
///
/// Hooks run on the connection's own task; a slow hook delays only that
/// connection.
pub trait RelayHandler: Send + Sync + 'static {
    /// Called after the transport handshake, before the connection is
    /// registered. Return `false` to refuse it.
    fn on_connect(&self, ctx: &SessionContext) -> impl Future<Output = bool> + Send {
        let _ = ctx;
        async { true }
    }

    /// Called for each inbound message before it is broadcast. Return
    /// `false` to drop the message.
    fn on_message(
        &self,
        ctx: &SessionContext,
        frame: &RelayFrame,
    ) -> impl Future<Output = bool> + Send {
        let _ = (ctx, frame);
        async { true }
    }

    /// Called once after the connection has been unregistered
    fn on_disconnect(&self, ctx: &SessionContext) -> impl Future<Output = ()> + Send {
        let _ = ctx;
        async {}
    }
}

/// Relays everything, observes nothing
impl RelayHandler for () {}
