use crate::entry::{relative_to, Entry};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

pub type ObserverFn = Arc<dyn Fn(&[Entry], &HashMap<String, Option<Value>>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Exact,
    Children,
    Descendants,
}

impl Relation {
    pub fn matches(&self, root: &str, key: &str) -> bool {
        match (self, relative_to(root, key)) {
            (_, None) => false,
            (Self::Exact, Some(rest)) => rest.is_empty(),
            (Self::Children, Some(rest)) => !rest.contains('/'),
            (Self::Descendants, Some(_)) => true,
        }
    }
}

struct Observer {
    id: ObserverId,
    root: String,
    relation: Relation,
    namespace: String,
    callback: ObserverFn,
    pending: Vec<Entry>,
    pending_keys: HashSet<String>,
}

impl Observer {
    fn wants(&self, key: &str, namespace: &str) -> bool {
        self.namespace == namespace && self.relation.matches(&self.root, key)
    }
}

pub(crate) struct Notification {
    callback: ObserverFn,
    entries: Vec<Entry>,
    values: HashMap<String, Option<Value>>,
}

impl Notification {
    pub fn deliver(self) {
        (self.callback)(&self.entries, &self.values);
    }
}

pub(crate) fn deliver_all(notifications: Vec<Notification>) {
    for notification in notifications {
        notification.deliver();
    }
}

#[derive(Default)]
pub(crate) struct ObserverRegistry {
    observers: Vec<Observer>,
    next_id: u64,
}

impl ObserverRegistry {
    pub fn add(
        &mut self,
        root: &Entry,
        relation: Relation,
        namespace: &str,
        callback: ObserverFn,
    ) -> ObserverId {
        self.next_id += 1;
        let id = ObserverId(self.next_id);

        self.observers.push(Observer {
            id,
            root: root.url().to_string(),
            relation,
            namespace: namespace.to_string(),
            callback,
            pending: Vec::new(),
            pending_keys: HashSet::new(),
        });

        id
    }

    pub fn remove(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|o| o.id != id);
        self.observers.len() != before
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn notify(
        &mut self,
        entry: &Entry,
        namespace: &str,
        batching: bool,
        value: Option<&Value>,
        out: &mut Vec<Notification>,
    ) {
        for observer in self.observers.iter_mut() {
            if !observer.wants(entry.url(), namespace) {
                continue;
            }

            if batching {
                if observer.pending_keys.insert(entry.url().to_string()) {
                    observer.pending.push(entry.clone());
                }
            } else {
                let mut values = HashMap::with_capacity(1);
                values.insert(entry.url().to_string(), value.cloned());
                out.push(Notification {
                    callback: Arc::clone(&observer.callback),
                    entries: vec![entry.clone()],
                    values,
                });
            }
        }
    }

    pub fn drain_pending<F>(&mut self, lookup: F) -> Vec<Notification>
    where
        F: Fn(&str, &str) -> Option<Value>,
    {
        let mut out = Vec::new();

        for observer in self.observers.iter_mut() {
            if observer.pending.is_empty() {
                continue;
            }

            let entries = std::mem::take(&mut observer.pending);
            observer.pending_keys.clear();

            let values = entries
                .iter()
                .map(|e| (e.url().to_string(), lookup(e.url(), &observer.namespace)))
                .collect();

            out.push(Notification {
                callback: Arc::clone(&observer.callback),
                entries,
                values,
            });
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_relation_matching() {
        assert!(Relation::Exact.matches("dir", "dir"));
        assert!(!Relation::Exact.matches("dir", "dir/a"));

        assert!(Relation::Children.matches("dir", "dir"));
        assert!(Relation::Children.matches("dir", "dir/a"));
        assert!(!Relation::Children.matches("dir", "dir/a/b"));

        assert!(Relation::Descendants.matches("dir", "dir/a/b"));
        assert!(!Relation::Descendants.matches("dir", "dir2/a"));
        assert!(!Relation::Children.matches("dir", "dir2"));
    }

    #[test]
    fn test_root_is_not_a_pattern() {
        // Keys are compared literally; "." is not a wildcard.
        assert!(!Relation::Descendants.matches("file:///a.b", "file:///aXb/c"));
        assert!(Relation::Descendants.matches("file:///a.b", "file:///a.b/c"));
    }

    #[test]
    fn test_registry_add_remove() {
        let mut registry = ObserverRegistry::default();
        let root = Entry::directory("file:///d");
        let id = registry.add(&root, Relation::Exact, "x", Arc::new(|_, _| {}));

        assert_eq!(registry.len(), 1);
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_batching_parks_entries_once() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let mut registry = ObserverRegistry::default();
        let root = Entry::directory("file:///d");
        registry.add(
            &root,
            Relation::Children,
            "x",
            Arc::new(move |entries, _| sink.lock().push(entries.len())),
        );

        let child = Entry::file("file:///d/a");
        let mut out = Vec::new();
        registry.notify(&child, "x", true, None, &mut out);
        registry.notify(&child, "x", true, None, &mut out);
        registry.notify(&child, "y", true, None, &mut out);
        assert!(out.is_empty());

        deliver_all(registry.drain_pending(|_, _| Some(Value::from(1))));
        assert_eq!(*seen.lock(), vec![1]);

        assert!(registry.drain_pending(|_, _| None).is_empty());
    }
}
