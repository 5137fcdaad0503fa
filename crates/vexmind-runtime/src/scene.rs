//! [`SceneSource`] – where the orchestrator gets a picture of the world.
//!
//! [`HttpSnapshotCamera`] pulls one JPEG frame per call from a camera that
//! serves still snapshots over HTTP (phone webcam apps, IP cameras).

use std::borrow::Cow;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use tracing::{debug, info};
use vexmind_types::VexError;

/// A captured frame, either raw JPEG bytes or a ready-to-send data URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneRef {
    DataUri(String),
    Raw(Vec<u8>),
}

impl SceneRef {
    /// Borrow or build a `data:image/jpeg;base64,…` URI for this frame.
    pub fn to_data_uri(&self) -> Cow<'_, str> {
        match self {
            SceneRef::DataUri(uri) => Cow::Borrowed(uri),
            SceneRef::Raw(bytes) => Cow::Owned(jpeg_data_uri(bytes)),
        }
    }
}

pub fn jpeg_data_uri(bytes: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode(bytes))
}

#[async_trait]
pub trait SceneSource: Send + Sync {
    /// Capture one frame.  With `encode` the frame comes back as a data URI.
    ///
    /// # Errors
    ///
    /// [`VexError::SceneUnavailable`] when no frame could be obtained.
    async fn snap_photo(&self, encode: bool) -> Result<SceneRef, VexError>;
}

/// Fetches still frames from an HTTP snapshot endpoint.
pub struct HttpSnapshotCamera {
    url: String,
    client: reqwest::Client,
}

impl HttpSnapshotCamera {
    /// # Errors
    ///
    /// [`VexError::SceneUnavailable`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, VexError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VexError::SceneUnavailable(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SceneSource for HttpSnapshotCamera {
    async fn snap_photo(&self, encode: bool) -> Result<SceneRef, VexError> {
        let unavailable = |e: reqwest::Error| VexError::SceneUnavailable(e.to_string());
        debug!(url = %self.url, "requesting camera frame");

        let bytes = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(unavailable)?
            .error_for_status()
            .map_err(unavailable)?
            .bytes()
            .await
            .map_err(unavailable)?;

        if bytes.is_empty() {
            return Err(VexError::SceneUnavailable(
                "camera returned an empty frame".into(),
            ));
        }
        info!(bytes = bytes.len(), "captured image from camera");

        Ok(if encode {
            SceneRef::DataUri(jpeg_data_uri(&bytes))
        } else {
            SceneRef::Raw(bytes.to_vec())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_frame_converts_to_data_uri() {
        let scene = SceneRef::Raw(vec![0xff, 0xd8, 0xff]);
        assert_eq!(scene.to_data_uri(), "data:image/jpeg;base64,/9j/");
    }

    #[test]
    fn data_uri_is_borrowed_as_is() {
        let scene = SceneRef::DataUri("data:image/jpeg;base64,AAAA".into());
        assert!(matches!(scene.to_data_uri(), Cow::Borrowed(_)));
    }

    #[tokio::test]
    async fn unreachable_camera_is_scene_unavailable() {
        let camera =
            HttpSnapshotCamera::new("http://127.0.0.1:1/shot.jpg", Duration::from_secs(2))
                .unwrap();
        let err = camera.snap_photo(true).await.unwrap_err();
        assert!(matches!(err, VexError::SceneUnavailable(_)));
    }
}
