use std::sync::Arc;

use common::{OptionMap, SockAddr};
use transport::{AcceptedSocket, PreAcceptHook, SrtListener, SrtTransport};

use crate::error::SessionError;

/// One bound endpoint, wrapping a transport listener with the
/// session-level accept loop. The reflector decides, from the accepted
/// stream option's mode, whether to build a [`crate::Receiver`] or a
/// [`crate::Sender`] out of each [`AcceptedSocket`] this yields.
pub struct Listener {
    listener: Arc<dyn SrtListener>,
    bind_addr: SockAddr,
}

impl Listener {
    pub async fn bind(
        transport: &dyn SrtTransport,
        bind_addr: SockAddr,
        pre_bind_options: &OptionMap,
    ) -> Result<Self, SessionError> {
        let listener = transport.bind(bind_addr, pre_bind_options).await?;
        Ok(Listener {
            listener,
            bind_addr,
        })
    }

    pub fn bind_addr(&self) -> SockAddr {
        self.bind_addr
    }

    pub fn set_pre_accept_hook(&self, hook: PreAcceptHook) {
        self.listener.set_pre_accept_hook(hook);
    }

    pub async fn accept(&self) -> Result<AcceptedSocket, SessionError> {
        self.listener.accept().await.map_err(SessionError::from)
    }

    pub fn close(&self) {
        self.listener.close();
    }
}
