use crate::{
    domain::PipelineGateway,
    errors::PipelineError,
    models::Session,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Content types the pipeline accepts. Checked before anything touches the
/// network.
const SUPPORTED_CONTENT_TYPES: [&str; 6] = [
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/webp",
    "image/gif",
    "image/heic",
];

/// Fields consulted, in priority order, when pulling a caption string out of
/// a response record.
const CAPTION_FIELDS: [&str; 4] = ["caption", "text", "content", "captionText"];

const CAPTION_RETRY_DELAY: Duration = Duration::from_secs(2);
const CAPTION_MAX_RETRIES: u32 = 2;

/// Sequences the four pipeline calls into one operation: presigned URL,
/// binary upload, image registration, caption generation.
///
/// Stages run strictly in order; each stage's output feeds the next, and a
/// failure aborts the rest. Remote side effects of completed stages are not
/// rolled back — a failure at caption generation leaves the uploaded image
/// and its registration behind on the pipeline service.
pub struct CaptionOrchestrator {
    gateway: Arc<dyn PipelineGateway>,
    retry_delay: Duration,
    max_retries: u32,
}

impl CaptionOrchestrator {
    pub fn new(gateway: Arc<dyn PipelineGateway>) -> Self {
        Self {
            gateway,
            retry_delay: CAPTION_RETRY_DELAY,
            max_retries: CAPTION_MAX_RETRIES,
        }
    }

    /// Runs the full pipeline for one image, given as a base64 data URI, and
    /// returns the generated caption strings.
    pub async fn process_image(
        &self,
        session: Option<&Session>,
        image_data: &str,
        content_type: &str,
    ) -> Result<Vec<String>, PipelineError> {
        if !SUPPORTED_CONTENT_TYPES.contains(&content_type) {
            return Err(PipelineError::UnsupportedContentType(
                content_type.to_string(),
            ));
        }

        let token = session
            .map(|s| s.access_token.as_str())
            .ok_or(PipelineError::NotAuthenticated)?;

        let upload = self
            .gateway
            .presigned_upload_url(token, content_type)
            .await?;

        let bytes = decode_image_payload(image_data)?;
        self.gateway
            .upload_bytes(&upload.presigned_url, bytes, content_type)
            .await?;

        let image_id = self.gateway.register_image(token, &upload.cdn_url).await?;
        tracing::debug!(image_id = %image_id, "image registered with pipeline");

        let records = self.request_captions_with_retry(token, &image_id).await?;

        let captions = extract_captions(&records);
        if captions.is_empty() {
            return Err(PipelineError::NoCaptions);
        }

        tracing::info!(count = captions.len(), "caption generation complete");
        Ok(captions)
    }

    /// Caption generation with the 504-specific bounded retry: a fixed delay
    /// between attempts, at most `max_retries` retries. Any other failure
    /// aborts immediately.
    async fn request_captions_with_retry(
        &self,
        token: &str,
        image_id: &str,
    ) -> Result<Vec<Value>, PipelineError> {
        let mut attempt = 0u32;
        loop {
            match self.gateway.request_captions(token, image_id).await {
                Ok(records) => return Ok(records),
                Err(PipelineError::CaptionGeneration { status: 504 })
                    if attempt < self.max_retries =>
                {
                    attempt += 1;
                    tracing::warn!(attempt, "caption service returned 504, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Strips a `data:…;base64,` prefix if present and decodes the remainder.
fn decode_image_payload(image_data: &str) -> Result<Vec<u8>, PipelineError> {
    let payload = if image_data.starts_with("data:") {
        image_data
            .split_once(";base64,")
            .map(|(_, rest)| rest)
            .unwrap_or(image_data)
    } else {
        image_data
    };

    BASE64
        .decode(payload)
        .map_err(|e| PipelineError::InvalidPayload(e.to_string()))
}

fn extract_captions(records: &[Value]) -> Vec<String> {
    records.iter().filter_map(extract_caption).collect()
}

/// Pulls a caption out of one response record: first truthy field in
/// priority order, else a stringified form of the whole record — the
/// upstream treats that as a valid (if ugly) caption, so we keep it rather
/// than dropping the record.
fn extract_caption(record: &Value) -> Option<String> {
    for field in CAPTION_FIELDS {
        if let Some(text) = record.get(field).and_then(truthy_text) {
            return Some(text);
        }
    }

    match record {
        Value::String(s) => (!s.is_empty()).then(|| s.clone()),
        _ => Some(record.to_string()),
    }
}

fn truthy_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        Value::Bool(true) => Some("true".to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PresignedUpload;
    use crate::models::User;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use uuid::Uuid;

    const IMAGE_DATA: &str = "data:image/png;base64,aGVsbG8=";

    /// Scripted gateway: counts calls per stage, fails where told to, and
    /// plays back a queue of caption-generation results.
    struct MockGateway {
        presign_calls: AtomicUsize,
        upload_calls: AtomicUsize,
        register_calls: AtomicUsize,
        caption_calls: AtomicUsize,
        fail_presign: bool,
        fail_upload: bool,
        fail_register: bool,
        caption_script: Mutex<VecDeque<Result<Vec<Value>, PipelineError>>>,
    }

    impl MockGateway {
        fn new() -> Self {
            Self {
                presign_calls: AtomicUsize::new(0),
                upload_calls: AtomicUsize::new(0),
                register_calls: AtomicUsize::new(0),
                caption_calls: AtomicUsize::new(0),
                fail_presign: false,
                fail_upload: false,
                fail_register: false,
                caption_script: Mutex::new(VecDeque::new()),
            }
        }

        fn with_captions(script: Vec<Result<Vec<Value>, PipelineError>>) -> Self {
            let gateway = Self::new();
            gateway.caption_script.lock().unwrap().extend(script);
            gateway
        }
    }

    #[async_trait]
    impl PipelineGateway for MockGateway {
        async fn presigned_upload_url(
            &self,
            _token: &str,
            _content_type: &str,
        ) -> Result<PresignedUpload, PipelineError> {
            self.presign_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_presign {
                return Err(PipelineError::UploadUrlFailed);
            }
            Ok(PresignedUpload {
                presigned_url: "https://uploads.example/slot".to_string(),
                cdn_url: "https://cdn.example/image.png".to_string(),
            })
        }

        async fn upload_bytes(
            &self,
            _presigned_url: &str,
            _bytes: Vec<u8>,
            _content_type: &str,
        ) -> Result<(), PipelineError> {
            self.upload_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_upload {
                return Err(PipelineError::UploadFailed);
            }
            Ok(())
        }

        async fn register_image(
            &self,
            _token: &str,
            _image_url: &str,
        ) -> Result<String, PipelineError> {
            self.register_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_register {
                return Err(PipelineError::RegistrationFailed);
            }
            Ok("img-123".to_string())
        }

        async fn request_captions(
            &self,
            _token: &str,
            _image_id: &str,
        ) -> Result<Vec<Value>, PipelineError> {
            self.caption_calls.fetch_add(1, Ordering::SeqCst);
            self.caption_script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(vec![json!({"caption": "fallback"})]))
        }
    }

    fn session() -> Session {
        Session {
            access_token: "token".to_string(),
            user: User {
                id: Uuid::new_v4(),
                email: None,
            },
        }
    }

    fn gateway_timeout() -> Result<Vec<Value>, PipelineError> {
        Err(PipelineError::CaptionGeneration { status: 504 })
    }

    #[tokio::test]
    async fn unsupported_type_fails_before_any_network_call() {
        let gateway = Arc::new(MockGateway::new());
        let orchestrator = CaptionOrchestrator::new(gateway.clone());

        let result = orchestrator
            .process_image(Some(&session()), IMAGE_DATA, "image/tiff")
            .await;

        assert_eq!(
            result,
            Err(PipelineError::UnsupportedContentType("image/tiff".into()))
        );
        assert_eq!(gateway.presign_calls.load(Ordering::SeqCst), 0);
        assert_eq!(gateway.upload_calls.load(Ordering::SeqCst), 0);
        assert_eq!(gateway.register_calls.load(Ordering::SeqCst), 0);
        assert_eq!(gateway.caption_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_session_fails_without_network_calls() {
        let gateway = Arc::new(MockGateway::new());
        let orchestrator = CaptionOrchestrator::new(gateway.clone());

        let result = orchestrator
            .process_image(None, IMAGE_DATA, "image/png")
            .await;

        assert_eq!(result, Err(PipelineError::NotAuthenticated));
        assert_eq!(gateway.presign_calls.load(Ordering::SeqCst), 0);
        assert_eq!(gateway.caption_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn presign_failure_halts_pipeline() {
        let mut gateway = MockGateway::new();
        gateway.fail_presign = true;
        let gateway = Arc::new(gateway);
        let orchestrator = CaptionOrchestrator::new(gateway.clone());

        let result = orchestrator
            .process_image(Some(&session()), IMAGE_DATA, "image/png")
            .await;

        assert_eq!(result, Err(PipelineError::UploadUrlFailed));
        assert_eq!(gateway.upload_calls.load(Ordering::SeqCst), 0);
        assert_eq!(gateway.register_calls.load(Ordering::SeqCst), 0);
        assert_eq!(gateway.caption_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn upload_failure_halts_pipeline() {
        let mut gateway = MockGateway::new();
        gateway.fail_upload = true;
        let gateway = Arc::new(gateway);
        let orchestrator = CaptionOrchestrator::new(gateway.clone());

        let result = orchestrator
            .process_image(Some(&session()), IMAGE_DATA, "image/png")
            .await;

        assert_eq!(result, Err(PipelineError::UploadFailed));
        assert_eq!(gateway.presign_calls.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.register_calls.load(Ordering::SeqCst), 0);
        assert_eq!(gateway.caption_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn registration_failure_halts_pipeline() {
        let mut gateway = MockGateway::new();
        gateway.fail_register = true;
        let gateway = Arc::new(gateway);
        let orchestrator = CaptionOrchestrator::new(gateway.clone());

        let result = orchestrator
            .process_image(Some(&session()), IMAGE_DATA, "image/png")
            .await;

        assert_eq!(result, Err(PipelineError::RegistrationFailed));
        assert_eq!(gateway.upload_calls.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.caption_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_on_504_with_fixed_spacing_then_succeeds() {
        let gateway = Arc::new(MockGateway::with_captions(vec![
            gateway_timeout(),
            gateway_timeout(),
            Ok(vec![json!({"caption": "A"})]),
        ]));
        let orchestrator = CaptionOrchestrator::new(gateway.clone());

        let start = tokio::time::Instant::now();
        let result = orchestrator
            .process_image(Some(&session()), IMAGE_DATA, "image/png")
            .await;

        assert_eq!(result, Ok(vec!["A".to_string()]));
        assert_eq!(gateway.caption_calls.load(Ordering::SeqCst), 3);
        // Two retries, two seconds apart each.
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_two_retries_on_repeated_504() {
        let gateway = Arc::new(MockGateway::with_captions(vec![
            gateway_timeout(),
            gateway_timeout(),
            gateway_timeout(),
        ]));
        let orchestrator = CaptionOrchestrator::new(gateway.clone());

        let result = orchestrator
            .process_image(Some(&session()), IMAGE_DATA, "image/png")
            .await;

        assert_eq!(
            result,
            Err(PipelineError::CaptionGeneration { status: 504 })
        );
        assert_eq!(gateway.caption_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_504_status_fails_without_retry() {
        let gateway = Arc::new(MockGateway::with_captions(vec![Err(
            PipelineError::CaptionGeneration { status: 500 },
        )]));
        let orchestrator = CaptionOrchestrator::new(gateway.clone());

        let result = orchestrator
            .process_image(Some(&session()), IMAGE_DATA, "image/png")
            .await;

        assert_eq!(
            result,
            Err(PipelineError::CaptionGeneration { status: 500 })
        );
        assert_eq!(gateway.caption_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_caption_response_is_a_failure() {
        let gateway = Arc::new(MockGateway::with_captions(vec![Ok(vec![])]));
        let orchestrator = CaptionOrchestrator::new(gateway);

        let result = orchestrator
            .process_image(Some(&session()), IMAGE_DATA, "image/png")
            .await;

        assert_eq!(result, Err(PipelineError::NoCaptions));
    }

    #[tokio::test]
    async fn all_falsy_records_are_a_failure() {
        let gateway = Arc::new(MockGateway::with_captions(vec![Ok(vec![
            Value::String(String::new()),
            Value::String(String::new()),
        ])]));
        let orchestrator = CaptionOrchestrator::new(gateway);

        let result = orchestrator
            .process_image(Some(&session()), IMAGE_DATA, "image/png")
            .await;

        assert_eq!(result, Err(PipelineError::NoCaptions));
    }

    #[test]
    fn extraction_respects_field_priority_and_record_fallback() {
        let records = vec![
            json!({"caption": "A"}),
            json!({"text": "B"}),
            json!({"content": "C"}),
            json!({"captionText": "D"}),
            json!({}),
        ];

        assert_eq!(
            extract_captions(&records),
            vec!["A", "B", "C", "D", "{}"]
        );
    }

    #[test]
    fn extraction_skips_falsy_fields() {
        let records = vec![json!({"caption": "", "text": "B"})];
        assert_eq!(extract_captions(&records), vec!["B"]);

        // An empty-string record is falsy through and through: dropped.
        let records = vec![Value::String(String::new()), json!({"caption": "A"})];
        assert_eq!(extract_captions(&records), vec!["A"]);
    }

    #[test]
    fn caption_field_beats_later_fields() {
        let records = vec![json!({"text": "later", "caption": "first"})];
        assert_eq!(extract_captions(&records), vec!["first"]);
    }

    #[test]
    fn decode_strips_data_uri_prefix() {
        assert_eq!(decode_image_payload(IMAGE_DATA).unwrap(), b"hello");
        // Bare base64 without a data URI wrapper is accepted as-is.
        assert_eq!(decode_image_payload("aGVsbG8=").unwrap(), b"hello");
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            decode_image_payload("data:image/png;base64,!!!"),
            Err(PipelineError::InvalidPayload(_))
        ));
    }
}
