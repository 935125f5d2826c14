use crate::entry::Entry;
use crate::provider::{MetadataProvider, Properties};
use crate::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

type Responder = Box<dyn Fn(usize, &Entry) -> Result<Option<Properties>> + Send + Sync>;

pub(crate) fn props(pairs: &[(&str, Value)]) -> Properties {
    pairs
        .iter()
        .map(|(namespace, value)| (namespace.to_string(), value.clone()))
        .collect()
}

pub(crate) struct ScriptedProvider {
    id: String,
    namespaces: Vec<String>,
    responder: Responder,
    calls: AtomicUsize,
    initialized: AtomicBool,
    gate: Option<Arc<Semaphore>>,
    log: Option<Arc<Mutex<Vec<String>>>>,
    supports: Option<Box<dyn Fn(&Entry) -> bool + Send + Sync>>,
}

impl ScriptedProvider {
    pub fn new<F>(id: &str, namespaces: &[&str], responder: F) -> Self
    where
        F: Fn(usize, &Entry) -> Result<Option<Properties>> + Send + Sync + 'static,
    {
        Self {
            id: id.to_string(),
            namespaces: namespaces.iter().map(|n| n.to_string()).collect(),
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
            initialized: AtomicBool::new(true),
            gate: None,
            log: None,
            supports: None,
        }
    }

    pub fn constant(id: &str, namespaces: &[&str], properties: Properties) -> Self {
        Self::new(id, namespaces, move |_, _| Ok(Some(properties.clone())))
    }

    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn logging(mut self, log: Arc<Mutex<Vec<String>>>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn supporting<F>(mut self, supports: F) -> Self
    where
        F: Fn(&Entry) -> bool + Send + Sync + 'static,
    {
        self.supports = Some(Box::new(supports));
        self
    }

    pub fn set_initialized(&self, initialized: bool) {
        self.initialized.store(initialized, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl MetadataProvider for ScriptedProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn supports_entry(&self, entry: &Entry) -> bool {
        self.supports.as_ref().map_or(true, |f| f(entry))
    }

    fn provides_type(&self, namespace: &str) -> bool {
        self.namespaces.iter().any(|n| n == namespace)
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    async fn fetch(&self, entry: &Entry, _namespace: &str) -> Result<Option<Properties>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(log) = &self.log {
            log.lock().push(format!("{}:{}", self.id, entry.url()));
        }

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        (self.responder)(call, entry)
    }
}
