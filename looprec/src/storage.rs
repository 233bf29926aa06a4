use async_trait::async_trait;
use bytes::Bytes;

/// The object-storage client is an external collaborator, named only by
/// the interface the core consumes — not implemented here. `put`/`get`
/// move a whole object; `delete` removes it.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, bucket: &str, key: &str, bytes: Bytes) -> Result<(), String>;

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, String>;

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), String>;
}
