pub mod content;
pub mod external;
pub mod filesystem;

use crate::entry::Entry;
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

pub type Properties = HashMap<String, Value>;

#[async_trait]
pub trait MetadataProvider: Send + Sync {
    fn id(&self) -> &str;

    fn supports_entry(&self, entry: &Entry) -> bool;

    fn provides_type(&self, namespace: &str) -> bool;

    fn is_initialized(&self) -> bool {
        true
    }

    /// Fetches metadata for `entry`. `namespace` is the one that triggered
    /// the fetch; returning others alongside it is encouraged. `Ok(None)`
    /// and errors both mean "nothing from this provider".
    async fn fetch(&self, entry: &Entry, namespace: &str) -> Result<Option<Properties>>;
}
