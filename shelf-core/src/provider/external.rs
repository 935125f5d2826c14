use crate::cache::namespace::{EXTERNAL, THUMBNAIL};
use crate::entry::Entry;
use crate::provider::{MetadataProvider, Properties};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

const PROVIDER_ID: &str = "external";

pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalProperties {
    pub volume_type: String,
    pub filesystem_type: String,
    pub device: String,
    pub mount_path: String,
    pub remote: bool,
    pub read_only: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub thumbnail_url: Option<String>,
}

#[async_trait]
pub trait ExternalBackend: Send + Sync {
    fn supports_entry(&self, entry: &Entry) -> bool;

    fn is_initialized(&self) -> bool {
        true
    }

    async fn get_entry_properties(&self, entries: &[Entry]) -> Result<Vec<Option<ExternalProperties>>>;
}

type Reply = oneshot::Sender<Result<Option<ExternalProperties>>>;

pub struct ExternalProvider {
    backend: Arc<dyn ExternalBackend>,
    batch_delay: Duration,
    queue: Arc<Mutex<Vec<(Entry, Reply)>>>,
}

impl ExternalProvider {
    pub fn new(backend: Arc<dyn ExternalBackend>, batch_delay: Duration) -> Self {
        Self {
            backend,
            batch_delay,
            queue: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn schedule_flush(&self) {
        let backend = Arc::clone(&self.backend);
        let queue = Arc::clone(&self.queue);
        let delay = self.batch_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let batch = std::mem::take(&mut *queue.lock());
            if batch.is_empty() {
                return;
            }

            let (entries, replies): (Vec<Entry>, Vec<Reply>) = batch.into_iter().unzip();
            tracing::debug!("Fetching external properties for {} entries", entries.len());

            match backend.get_entry_properties(&entries).await {
                Ok(results) => {
                    if results.len() != entries.len() {
                        tracing::warn!(
                            "External backend returned {} results for {} entries",
                            results.len(),
                            entries.len()
                        );
                    }
                    let mut results = results.into_iter();
                    for reply in replies {
                        let _ = reply.send(Ok(results.next().flatten()));
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    for reply in replies {
                        let _ = reply.send(Err(Error::provider(PROVIDER_ID, message.clone())));
                    }
                }
            }
        });
    }
}

fn to_properties(external: ExternalProperties) -> Result<Properties> {
    let mut properties = Properties::new();
    if let Some(url) = &external.thumbnail_url {
        properties.insert(THUMBNAIL.to_string(), json!({ "url": url }));
    }
    properties.insert(EXTERNAL.to_string(), serde_json::to_value(external)?);
    Ok(properties)
}

#[async_trait]
impl MetadataProvider for ExternalProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    fn supports_entry(&self, entry: &Entry) -> bool {
        self.backend.supports_entry(entry)
    }

    fn provides_type(&self, namespace: &str) -> bool {
        namespace == EXTERNAL || namespace == THUMBNAIL
    }

    fn is_initialized(&self) -> bool {
        self.backend.is_initialized()
    }

    async fn fetch(&self, entry: &Entry, _namespace: &str) -> Result<Option<Properties>> {
        let (tx, rx) = oneshot::channel();
        let first = {
            let mut queue = self.queue.lock();
            queue.push((entry.clone(), tx));
            queue.len() == 1
        };

        if first {
            self.schedule_flush();
        }

        let external = rx
            .await
            .map_err(|_| Error::provider(PROVIDER_ID, "batch dropped before reply"))??;

        external.map(to_properties).transpose()
    }
}
