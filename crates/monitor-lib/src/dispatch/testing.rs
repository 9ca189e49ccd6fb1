//! In-memory sinks for unit tests

use super::RemoteSink;
use crate::error::{StoreError, TransportError};
use crate::models::ClassificationResult;
use crate::store::ResultStore;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Records everything it is sent
#[derive(Default)]
pub struct RecordingRemote {
    pub sent: Mutex<Vec<ClassificationResult>>,
}

impl RecordingRemote {
    pub fn sent(&self) -> Vec<ClassificationResult> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteSink for RecordingRemote {
    async fn send(&self, result: &ClassificationResult) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(result.clone());
        Ok(())
    }

    fn describe(&self) -> Option<String> {
        Some("recording".to_string())
    }
}

/// Always times out
#[derive(Default)]
pub struct UnreachableRemote {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl RemoteSink for UnreachableRemote {
    async fn send(&self, _result: &ClassificationResult) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(TransportError::Timeout(Duration::from_millis(1)))
    }

    fn describe(&self) -> Option<String> {
        Some("unreachable:12201/udp".to_string())
    }
}

/// Result store whose inserts always fail
#[derive(Default)]
pub struct BrokenStore {
    pub attempts: AtomicUsize,
}

impl ResultStore for BrokenStore {
    fn insert(&self, _result: &ClassificationResult) -> Result<i64, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::LockPoisoned)
    }

    fn count_results(&self) -> Result<u64, StoreError> {
        Ok(0)
    }

    fn count_attacks(&self) -> Result<u64, StoreError> {
        Ok(0)
    }
}
