use crate::{
    domain::{PipelineGateway, PresignedUpload},
    errors::{PipelineError, PipelineStage},
};
use async_trait::async_trait;
use reqwest::header;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Every pipeline call must resolve within this window.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the third-party captioning pipeline.
#[derive(Debug, Clone)]
pub struct HttpPipelineGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPipelineGateway {
    pub fn new(base_url: String) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client, base_url })
    }

    fn transport_error(stage: PipelineStage, err: reqwest::Error) -> PipelineError {
        if err.is_timeout() {
            tracing::warn!(%stage, "pipeline request timed out");
            PipelineError::Timeout(stage)
        } else {
            tracing::error!(%stage, error = %err, "pipeline request failed");
            PipelineError::Transport(stage)
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PresignRequest<'a> {
    content_type: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PresignResponse {
    presigned_url: Option<String>,
    cdn_url: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest<'a> {
    image_url: &'a str,
    is_common_use: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterResponse {
    image_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CaptionsRequest<'a> {
    image_id: &'a str,
}

#[async_trait]
impl PipelineGateway for HttpPipelineGateway {
    async fn presigned_upload_url(
        &self,
        token: &str,
        content_type: &str,
    ) -> Result<PresignedUpload, PipelineError> {
        let response = self
            .client
            .post(format!("{}/pipeline/generate-presigned-url", self.base_url))
            .bearer_auth(token)
            .json(&PresignRequest { content_type })
            .send()
            .await
            .map_err(|e| Self::transport_error(PipelineStage::UploadUrl, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, body = %body, "presigned URL request rejected");
            return Err(PipelineError::UploadUrlFailed);
        }

        let payload: PresignResponse = response
            .json()
            .await
            .map_err(|_| PipelineError::UploadUrlMalformed)?;

        match (payload.presigned_url, payload.cdn_url) {
            (Some(presigned_url), Some(cdn_url)) => Ok(PresignedUpload {
                presigned_url,
                cdn_url,
            }),
            _ => Err(PipelineError::UploadUrlMalformed),
        }
    }

    async fn upload_bytes(
        &self,
        presigned_url: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), PipelineError> {
        tracing::debug!(size = bytes.len(), content_type, "uploading image bytes");

        // The presigned URL is pre-authorized; no bearer token here.
        let response = self
            .client
            .put(presigned_url)
            .header(header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| Self::transport_error(PipelineStage::Upload, e))?;

        if !response.status().is_success() {
            tracing::error!(status = %response.status(), "image upload rejected");
            return Err(PipelineError::UploadFailed);
        }
        Ok(())
    }

    async fn register_image(&self, token: &str, image_url: &str) -> Result<String, PipelineError> {
        let response = self
            .client
            .post(format!("{}/pipeline/upload-image-from-url", self.base_url))
            .bearer_auth(token)
            .json(&RegisterRequest {
                image_url,
                is_common_use: false,
            })
            .send()
            .await
            .map_err(|e| Self::transport_error(PipelineStage::Registration, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, body = %body, "image registration rejected");
            return Err(PipelineError::RegistrationFailed);
        }

        let payload: RegisterResponse = response
            .json()
            .await
            .map_err(|_| PipelineError::RegistrationMalformed)?;

        payload
            .image_id
            .ok_or(PipelineError::RegistrationMalformed)
    }

    async fn request_captions(
        &self,
        token: &str,
        image_id: &str,
    ) -> Result<Vec<serde_json::Value>, PipelineError> {
        let response = self
            .client
            .post(format!("{}/pipeline/generate-captions", self.base_url))
            .bearer_auth(token)
            .json(&CaptionsRequest { image_id })
            .send()
            .await
            .map_err(|e| Self::transport_error(PipelineStage::Captions, e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status, body = %body, "caption generation rejected");
            return Err(PipelineError::CaptionGeneration { status });
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|_| PipelineError::CaptionsMalformed)?;

        match payload {
            serde_json::Value::Array(records) => Ok(records),
            _ => Err(PipelineError::CaptionsMalformed),
        }
    }
}
