//! Single-writer memory service.
//!
//! One blocking task owns the store and drains a command channel; every
//! store, recall and count runs to completion before the next starts.
//! Callers hold cheap [`MemoryHandle`] clones and await oneshot replies.

use memory_types::{MemoryRecord, Metadata, NodeId};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::error::VectorError;
use crate::index::MemoryStore;

const COMMAND_BUFFER: usize = 64;

type Reply<T> = oneshot::Sender<Result<T, VectorError>>;

enum Command {
    Store {
        content: String,
        vector: Vec<f32>,
        metadata: Metadata,
        reply: Reply<NodeId>,
    },
    Recall {
        query: Vec<f32>,
        k: usize,
        reply: Reply<Vec<MemoryRecord>>,
    },
    Len {
        reply: oneshot::Sender<usize>,
    },
}

pub struct MemoryService;

impl MemoryService {
    /// Move `store` onto a blocking task and return a handle to it.
    ///
    /// The task ends once every handle is dropped. Must be called from
    /// inside a tokio runtime.
    pub fn spawn(store: Box<dyn MemoryStore>) -> MemoryHandle {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let backend = store.backend();
        tokio::task::spawn_blocking(move || run(store, rx));
        info!(backend, "Memory service started");
        MemoryHandle { tx, backend }
    }
}

fn run(mut store: Box<dyn MemoryStore>, mut rx: mpsc::Receiver<Command>) {
    while let Some(command) = rx.blocking_recv() {
        match command {
            Command::Store {
                content,
                vector,
                metadata,
                reply,
            } => {
                let result = store.store(&content, &vector, &metadata);
                let _ = reply.send(result);
            }
            Command::Recall { query, k, reply } => {
                let _ = reply.send(store.recall(&query, k));
            }
            Command::Len { reply } => {
                let _ = reply.send(store.len());
            }
        }
    }
    debug!(backend = store.backend(), "Memory service stopped");
}

/// Cloneable client of a running [`MemoryService`].
#[derive(Clone)]
pub struct MemoryHandle {
    tx: mpsc::Sender<Command>,
    backend: &'static str,
}

impl MemoryHandle {
    pub async fn store(
        &self,
        content: impl Into<String>,
        vector: Vec<f32>,
        metadata: Metadata,
    ) -> Result<NodeId, VectorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Store {
            content: content.into(),
            vector,
            metadata,
            reply,
        })
        .await?;
        rx.await.map_err(|_| VectorError::ServiceClosed)?
    }

    pub async fn recall(&self, query: Vec<f32>, k: usize) -> Result<Vec<MemoryRecord>, VectorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Recall { query, k, reply }).await?;
        rx.await.map_err(|_| VectorError::ServiceClosed)?
    }

    pub async fn len(&self) -> Result<usize, VectorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Len { reply }).await?;
        rx.await.map_err(|_| VectorError::ServiceClosed)
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }

    async fn send(&self, command: Command) -> Result<(), VectorError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| VectorError::ServiceClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// In-memory store recording the order commands arrive in.
    #[derive(Default)]
    struct RecordingStore {
        items: Vec<(String, Vec<f32>)>,
    }

    impl MemoryStore for RecordingStore {
        fn store(
            &mut self,
            content: &str,
            vector: &[f32],
            _metadata: &Metadata,
        ) -> Result<NodeId, VectorError> {
            if vector.is_empty() {
                return Err(VectorError::InvalidInput("vector is empty".to_string()));
            }
            self.items.push((content.to_string(), vector.to_vec()));
            Ok(self.items.len() as NodeId)
        }

        fn recall(&self, _query: &[f32], k: usize) -> Result<Vec<MemoryRecord>, VectorError> {
            Ok(self
                .items
                .iter()
                .enumerate()
                .take(k)
                .map(|(i, (content, _))| {
                    MemoryRecord::new(i as NodeId + 1, content.clone(), Metadata::new(), 1.0)
                })
                .collect())
        }

        fn len(&self) -> usize {
            self.items.len()
        }

        fn backend(&self) -> &'static str {
            "recording"
        }
    }

    #[tokio::test]
    async fn test_store_and_recall_through_handle() {
        let handle = MemoryService::spawn(Box::new(RecordingStore::default()));
        assert_eq!(handle.backend(), "recording");

        let id = handle.store("hello", vec![1.0], Metadata::new()).await.unwrap();
        assert_eq!(id, 1);
        assert_eq!(handle.len().await.unwrap(), 1);

        let results = handle.recall(vec![1.0], 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "hello");
    }

    #[tokio::test]
    async fn test_store_errors_are_returned() {
        let handle = MemoryService::spawn(Box::new(RecordingStore::default()));
        let err = handle.store("x", Vec::new(), Metadata::new()).await.unwrap_err();
        assert!(matches!(err, VectorError::InvalidInput(_)));
        assert_eq!(handle.len().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_get_unique_ids() {
        let handle = MemoryService::spawn(Box::new(RecordingStore::default()));

        let mut tasks = Vec::new();
        for i in 0..32 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                handle
                    .store(format!("m{i}"), vec![i as f32], Metadata::new())
                    .await
                    .unwrap()
            }));
        }

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap());
        }
        ids.sort_unstable();
        assert_eq!(ids, (1..=32).collect::<Vec<NodeId>>());
        assert_eq!(handle.len().await.unwrap(), 32);
    }

    struct PanickingStore;

    impl MemoryStore for PanickingStore {
        fn store(&mut self, _: &str, _: &[f32], _: &Metadata) -> Result<NodeId, VectorError> {
            panic!("store failed hard");
        }

        fn recall(&self, _: &[f32], _: usize) -> Result<Vec<MemoryRecord>, VectorError> {
            Ok(Vec::new())
        }

        fn len(&self) -> usize {
            0
        }

        fn backend(&self) -> &'static str {
            "panicking"
        }
    }

    #[tokio::test]
    async fn test_dead_service_reports_closed() {
        let handle = MemoryService::spawn(Box::new(PanickingStore));
        let err = handle.store("a", vec![1.0], Metadata::new()).await.unwrap_err();
        assert!(matches!(err, VectorError::ServiceClosed));
        assert!(matches!(handle.len().await, Err(VectorError::ServiceClosed)));
    }
}
