//! Client for the external face-detection service.
//!
//! The service takes a JPEG body on `POST /v1/faces:detect` and answers with
//! `{"face_count": n}`. Only the count matters here; landmark data stays on
//! the service side.

use core::time::Duration;

use gradreg_config::VisionConfig;
use serde::Deserialize;
use tracing::debug;

#[derive(thiserror::Error, Debug)]
pub enum VisionError {
    #[error("face detection did not answer in time")]
    Timeout,
    #[error("face detection request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("face detection answered with status {0}")]
    UnexpectedStatus(reqwest::StatusCode),
}

/// What the portrait check decided about an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoClassification {
    NoFace,
    ExactlyOneFace,
    MultipleFaces(usize),
}

/// Maps a raw face count onto the admission decision.
#[must_use]
pub const fn classify(face_count: usize) -> PhotoClassification {
    match face_count {
        0 => PhotoClassification::NoFace,
        1 => PhotoClassification::ExactlyOneFace,
        n => PhotoClassification::MultipleFaces(n),
    }
}

#[derive(Deserialize)]
struct DetectFacesResponse {
    face_count: usize,
}

#[derive(Clone)]
pub struct FaceDetectionClient {
    http: reqwest::Client,
    base_url: String,
}

impl FaceDetectionClient {
    pub fn new(config: &VisionConfig) -> Result<Self, VisionError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
        })
    }

    /// Submits the image and returns the number of detected faces.
    pub async fn detect_faces(&self, image: &[u8]) -> Result<usize, VisionError> {
        let response = self
            .http
            .post(format!("{}/v1/faces:detect", self.base_url))
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(image.to_vec())
            .send()
            .await
            .map_err(timeout_aware)?;
        if !response.status().is_success() {
            return Err(VisionError::UnexpectedStatus(response.status()));
        }
        let body: DetectFacesResponse = response.json().await.map_err(timeout_aware)?;
        debug!(face_count = body.face_count, "face detection answered");
        Ok(body.face_count)
    }

    /// [`detect_faces`](Self::detect_faces) followed by [`classify`].
    pub async fn classify_photo(&self, image: &[u8]) -> Result<PhotoClassification, VisionError> {
        Ok(classify(self.detect_faces(image).await?))
    }
}

fn timeout_aware(err: reqwest::Error) -> VisionError {
    if err.is_timeout() {
        VisionError::Timeout
    } else {
        VisionError::Http(err)
    }
}
