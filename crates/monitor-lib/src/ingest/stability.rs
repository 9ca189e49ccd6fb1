//! Stability gate for files that an upstream writer may still be appending to

use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Configuration for the stability gate
#[derive(Debug, Clone)]
pub struct StabilityConfig {
    /// Maximum number of size samples taken (default: 3)
    pub checks: u32,
    /// Delay between two consecutive samples (default: 200ms)
    pub delay: Duration,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            checks: 3,
            delay: Duration::from_millis(200),
        }
    }
}

/// Confirms a file is not mid-write before it is read
#[derive(Debug, Clone, Default)]
pub struct StabilityGate {
    config: StabilityConfig,
}

impl StabilityGate {
    pub fn new(config: StabilityConfig) -> Self {
        Self { config }
    }

    /// Returns true as soon as two consecutive size samples are equal and
    /// nonzero. Returns false if the file disappears or the sample budget
    /// runs out first.
    pub async fn is_stable(&self, path: &Path) -> bool {
        let mut previous: Option<u64> = None;

        for attempt in 0..self.config.checks {
            let size = match tokio::fs::metadata(path).await {
                Ok(meta) => meta.len(),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "File vanished during stability check");
                    return false;
                }
            };

            if size > 0 && previous == Some(size) {
                return true;
            }
            previous = Some(size);

            if attempt + 1 < self.config.checks {
                tokio::time::sleep(self.config.delay).await;
            }
        }

        debug!(
            path = %path.display(),
            checks = self.config.checks,
            "File did not stabilise within the sample budget"
        );
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn fast_gate(checks: u32) -> StabilityGate {
        StabilityGate::new(StabilityConfig {
            checks,
            delay: Duration::from_millis(20),
        })
    }

    #[tokio::test]
    async fn test_stable_file_passes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("flows.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();

        assert!(fast_gate(3).is_stable(&path).await);
    }

    #[tokio::test]
    async fn test_missing_file_is_not_stable() {
        let dir = TempDir::new().unwrap();
        assert!(!fast_gate(3).is_stable(&dir.path().join("gone.csv")).await);
    }

    #[tokio::test]
    async fn test_empty_file_is_not_stable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.csv");
        std::fs::write(&path, "").unwrap();

        assert!(!fast_gate(4).is_stable(&path).await);
    }

    #[tokio::test]
    async fn test_single_sample_can_never_be_stable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("flows.csv");
        std::fs::write(&path, "a\n1\n").unwrap();

        assert!(!fast_gate(1).is_stable(&path).await);
    }

    #[tokio::test]
    async fn test_growing_file_is_not_stable() {
        let dir = TempDir::new().unwrap();
        let path = Arc::new(dir.path().join("growing.csv"));
        std::fs::write(path.as_ref(), "a\n").unwrap();

        let writer_path = path.clone();
        let writer = tokio::spawn(async move {
            for i in 0..20 {
                let mut content = std::fs::read_to_string(writer_path.as_ref()).unwrap();
                content.push_str(&format!("{}\n", i));
                std::fs::write(writer_path.as_ref(), content).unwrap();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        let gate = StabilityGate::new(StabilityConfig {
            checks: 3,
            delay: Duration::from_millis(25),
        });
        assert!(!gate.is_stable(&path).await);
        writer.await.unwrap();
    }
}
