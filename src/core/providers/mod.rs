mod file;
mod firestore;
mod provider;

pub use file::FileProvider;
pub use firestore::{create_client, FirestoreProvider};
pub use provider::{Provider, ProviderEvent};
