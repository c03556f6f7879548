//! Live connection handle

use tokio::task::JoinHandle;
use tokio_postgres::Client;

/// An established, authenticated session owned by the caller.
///
/// The socket is driven by a background task that ends once the handle is
/// dropped or [`close`](Self::close)d. Nothing else keeps a reference to it.
pub struct ConnectionHandle {
    client: Client,
    driver: JoinHandle<()>,
    endpoint: String,
    encrypted: bool,
}

impl ConnectionHandle {
    pub(crate) fn new(
        client: Client,
        driver: JoinHandle<()>,
        endpoint: String,
        encrypted: bool,
    ) -> Self {
        Self {
            client,
            driver,
            endpoint,
            encrypted,
        }
    }

    /// Driver client for issuing queries
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Mutable driver client (needed for transactions)
    pub fn client_mut(&mut self) -> &mut Client {
        &mut self.client
    }

    /// Server endpoint (`host:port` or socket path)
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Whether the session runs over TLS
    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// Whether the server side or the socket task has gone away
    pub fn is_closed(&self) -> bool {
        self.client.is_closed()
    }

    /// Close the session and wait for the socket task to finish
    pub async fn close(self) {
        let Self {
            client,
            driver,
            endpoint,
            ..
        } = self;

        // Dropping the last client sends Terminate and ends the socket task
        drop(client);
        if let Err(e) = driver.await {
            tracing::warn!(%endpoint, error = %e, "connection task did not shut down cleanly");
        } else {
            tracing::debug!(%endpoint, "connection closed");
        }
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("endpoint", &self.endpoint)
            .field("encrypted", &self.encrypted)
            .field("closed", &self.is_closed())
            .finish()
    }
}
