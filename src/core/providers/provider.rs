use async_trait::async_trait;

/// A change notification emitted by a live [`Provider`] after its
/// initial snapshot has been returned from [`Provider::start`].
#[derive(Debug, Clone)]
pub enum ProviderEvent<T> {
    Added(T),
    Modified(T),
    Removed(String),
}

/// Something that can hand back an initial snapshot of `T` and then
/// keep emitting updates. File-backed providers never call `on_event`
/// after returning; live (Firestore) providers do.
#[async_trait]
pub trait Provider<T>: Send + Sync {
    async fn start(
        &self,
        on_event: Box<dyn Fn(ProviderEvent<T>) + Send + Sync>,
    ) -> Result<Vec<T>, anyhow::Error>;
}
