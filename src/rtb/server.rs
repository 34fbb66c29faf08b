//! Thin lifecycle wrapper around the actix-web `HttpServer` handle, so
//! startup/shutdown tasks can hold and stop it without reaching into
//! actix internals directly.

use actix_web::dev::ServerHandle;

pub struct Server {
    handle: ServerHandle,
}

impl Server {
    pub fn new(handle: ServerHandle) -> Self {
        Self { handle }
    }

    /// Initiates graceful shutdown, letting in-flight requests finish.
    pub async fn stop(&self) {
        self.handle.stop(true).await;
    }
}
