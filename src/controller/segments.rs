//! Segmentation directory
//!
//! Every launched experiment owns a synthetic segment `abtest_<experimentID>`
//! maintained by the segmentation subsystem. After an archive or delete the
//! engine re-fetches the segment list so that segment disappears from view.

use crate::controller::persistence::Scope;
use crate::model::parse_synthetic_segment_id;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("Segment HTTP error: {0}")]
    Http(String),

    #[error("Invalid segment response: {0}")]
    InvalidResponse(String),
}

/// Trait for the segmentation subsystem
#[async_trait]
pub trait SegmentDirectory: Send + Sync {
    /// Re-fetch the segment list for the scope
    async fn refresh(&self, scope: &Scope) -> Result<(), SegmentError>;
}

/// Directory that does nothing (no segmentation service configured)
pub struct NoOpSegmentDirectory;

#[async_trait]
impl SegmentDirectory for NoOpSegmentDirectory {
    async fn refresh(&self, _scope: &Scope) -> Result<(), SegmentError> {
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct SegmentListResponse {
    success: bool,
    #[serde(default)]
    segments: Vec<SegmentEntry>,
}

#[derive(Debug, Deserialize)]
struct SegmentEntry {
    #[serde(rename = "segmentID")]
    segment_id: String,
}

/// Segment directory backed by the `listSegments` call
///
/// Caches the fetched segment ids for lookups.
pub struct HttpSegmentDirectory {
    client: reqwest::Client,
    base_url: String,
    segments: RwLock<Vec<String>>,
}

impl HttpSegmentDirectory {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SegmentError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SegmentError::Http(format!("Failed to build client: {}", e)))?;
        Ok(HttpSegmentDirectory {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            segments: RwLock::new(Vec::new()),
        })
    }

    /// Segment ids from the last successful refresh
    pub fn segment_ids(&self) -> Vec<String> {
        self.segments
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Experiment ids that still own a synthetic segment
    pub fn experiment_segments(&self) -> Vec<String> {
        self.segment_ids()
            .iter()
            .filter_map(|id| parse_synthetic_segment_id(id))
            .map(str::to_string)
            .collect()
    }

    fn store(&self, segments: Vec<String>) {
        if let Ok(mut guard) = self.segments.write() {
            *guard = segments;
        }
    }
}

#[async_trait]
impl SegmentDirectory for HttpSegmentDirectory {
    async fn refresh(&self, scope: &Scope) -> Result<(), SegmentError> {
        let url = format!("{}/listSegments", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(scope)
            .send()
            .await
            .map_err(|e| SegmentError::Http(format!("listSegments failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(SegmentError::Http(format!(
                "listSegments returned HTTP {}",
                response.status()
            )));
        }

        let body: SegmentListResponse = response
            .json()
            .await
            .map_err(|e| SegmentError::InvalidResponse(e.to_string()))?;
        if !body.success {
            return Err(SegmentError::InvalidResponse(
                "listSegments returned success=false".to_string(),
            ));
        }

        let ids: Vec<String> = body.segments.into_iter().map(|s| s.segment_id).collect();
        debug!(count = ids.len(), "Segment list refreshed");
        self.store(ids);
        Ok(())
    }
}

/// Mock segment directory for testing - counts refreshes
#[cfg(test)]
#[derive(Default)]
pub struct MockSegmentDirectory {
    refreshes: std::sync::atomic::AtomicUsize,
    fail: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl MockSegmentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
#[async_trait]
impl SegmentDirectory for MockSegmentDirectory {
    async fn refresh(&self, _scope: &Scope) -> Result<(), SegmentError> {
        self.refreshes
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(SegmentError::Http("mock failure".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_experiment_segments_filters_synthetic() {
        let directory = HttpSegmentDirectory::new("http://seg", Duration::from_secs(1)).unwrap();
        directory.store(vec![
            "everyone".to_string(),
            "abtest_exp-1".to_string(),
            "whales".to_string(),
            "abtest_".to_string(),
            "abtest_exp-2".to_string(),
        ]);
        assert_eq!(directory.experiment_segments(), vec!["exp-1", "exp-2"]);
        assert_eq!(directory.segment_ids().len(), 5);
    }

    #[test]
    fn test_segment_list_response_parses() {
        let body: SegmentListResponse = serde_json::from_str(
            r#"{"success":true,"segments":[{"segmentID":"everyone"},{"segmentID":"abtest_x"}]}"#,
        )
        .unwrap();
        assert!(body.success);
        assert_eq!(body.segments.len(), 2);
        assert_eq!(body.segments[1].segment_id, "abtest_x");
    }

    #[tokio::test]
    async fn test_mock_directory_counts_refreshes() {
        let directory = MockSegmentDirectory::new();
        let scope = Scope::new("g", "b");
        directory.refresh(&scope).await.unwrap();
        directory.set_fail(true);
        assert!(directory.refresh(&scope).await.is_err());
        assert_eq!(directory.refresh_count(), 2);
    }

    #[tokio::test]
    async fn test_noop_directory() {
        assert!(NoOpSegmentDirectory
            .refresh(&Scope::new("g", "b"))
            .await
            .is_ok());
    }
}
