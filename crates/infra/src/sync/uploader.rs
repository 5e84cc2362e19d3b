//! HTTP uploader: one `POST {api_base_url}/{endpoint}` per submission.

use async_trait::async_trait;
use fieldsync_common::sync::retry::{classify_status, HttpOutcome};
use fieldsync_core::SubmissionUploader;
use fieldsync_domain::{EndpointConfig, FieldSyncError, Submission, SyncConfig, SyncError};
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Method, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::http::HttpClient;

/// Request body sent for every submission.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadBody<'a> {
    team_number: u32,
    event_key: &'a str,
    match_key: Option<&'a str>,
    data: &'a serde_json::Value,
    metadata: UploadMetadata,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadMetadata {
    created_at: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// [`SubmissionUploader`] talking to the scouting REST API.
pub struct HttpSubmissionUploader {
    client: HttpClient,
    base_url: Url,
    endpoints: EndpointConfig,
}

impl HttpSubmissionUploader {
    /// # Errors
    /// `Config` when `api_base_url` is not a valid absolute URL.
    pub fn new(
        client: HttpClient,
        api_base_url: &str,
        endpoints: EndpointConfig,
    ) -> Result<Self, FieldSyncError> {
        let mut base_url = Url::parse(api_base_url.trim()).map_err(|e| {
            FieldSyncError::Config(format!("invalid api_base_url {api_base_url:?}: {e}"))
        })?;
        // `Url::join` replaces the last path segment unless the base ends in '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { client, base_url, endpoints })
    }

    /// Build the uploader and its client from configuration.
    pub fn from_config(config: &SyncConfig) -> Result<Self, FieldSyncError> {
        let client = HttpClient::builder().timeout(config.request_timeout()).build()?;
        Self::new(client, &config.api_base_url, config.endpoints.clone())
    }

    /// Absolute endpoint URL for `submission`'s type.
    pub fn endpoint_for(&self, submission: &Submission) -> Result<Url, SyncError> {
        let path = self.endpoints.path_for(submission.submission_type).ok_or_else(|| {
            SyncError::validation(format!(
                "no endpoint configured for submission type {}",
                submission.submission_type
            ))
        })?;
        self.base_url
            .join(path)
            .map_err(|e| SyncError::validation(format!("invalid endpoint path {path:?}: {e}")))
    }
}

#[async_trait]
impl SubmissionUploader for HttpSubmissionUploader {
    #[instrument(skip(self, submission), fields(submission_id = %submission.id, submission_type = %submission.submission_type))]
    async fn upload(&self, submission: &Submission) -> Result<(), SyncError> {
        let url = self.endpoint_for(submission)?;

        let body = UploadBody {
            team_number: submission.team_number,
            event_key: &submission.event_key,
            match_key: submission.match_key.as_deref(),
            data: &submission.payload,
            metadata: UploadMetadata {
                created_at: submission
                    .created_at
                    .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            },
        };

        let mut request = self.client.request(Method::POST, url).json(&body);
        for (name, value) in &submission.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| SyncError::validation(format!("invalid header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| SyncError::validation(format!("invalid header value for {}: {e}", name.as_str())))?;
            request = request.header(name, value);
        }

        let response = self.client.send(request).await?;
        let status = response.status().as_u16();
        let outcome = classify_status(status);
        if outcome == HttpOutcome::Success {
            debug!(status, "submission accepted");
            return Ok(());
        }

        let message = error_message(response).await;
        warn!(status, ?outcome, error = %message, "submission rejected");
        Err(SyncError::http(status, message))
    }
}

/// Prefer the body's `message` field, then the raw body, then the reason phrase.
async fn error_message(response: Response) -> String {
    let reason = response.status().canonical_reason().unwrap_or("unknown status").to_string();
    let Ok(text) = response.text().await else {
        return reason;
    };

    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(ErrorBody { message: Some(message) }) if !message.trim().is_empty() => message,
        _ if !text.trim().is_empty() && text.len() <= 512 => text.trim().to_string(),
        _ => reason,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use fieldsync_domain::{NewSubmission, SubmissionType, SyncErrorKind};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn uploader(base: &str, endpoints: EndpointConfig) -> HttpSubmissionUploader {
        HttpSubmissionUploader::new(HttpClient::new().unwrap(), base, endpoints).unwrap()
    }

    fn submission(submission_type: SubmissionType) -> Submission {
        Submission::create(
            NewSubmission::new(submission_type, 2056, "2024onto", json!({"climb": true}))
                .with_match_key("2024onto_qm12")
                .with_header("x-scout-id", "scout-7"),
            Utc.with_ymd_and_hms(2024, 3, 2, 14, 5, 9).unwrap(),
        )
    }

    #[tokio::test]
    async fn posts_wire_body_and_headers_to_type_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/match-scouting"))
            .and(header("x-scout-id", "scout-7"))
            .and(body_json(json!({
                "teamNumber": 2056,
                "eventKey": "2024onto",
                "matchKey": "2024onto_qm12",
                "data": {"climb": true},
                "metadata": {"createdAt": "2024-03-02T14:05:09.000Z"}
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let uploader = uploader(&format!("{}/api", server.uri()), EndpointConfig::default());

        uploader.upload(&submission(SubmissionType::MatchScouting)).await.unwrap();
    }

    #[tokio::test]
    async fn error_body_message_becomes_error_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(422).set_body_json(json!({"message": "matchKey unknown"})),
            )
            .mount(&server)
            .await;

        let err = uploader(&server.uri(), EndpointConfig::default())
            .upload(&submission(SubmissionType::PitScouting))
            .await
            .unwrap_err();

        assert_eq!(err.status, Some(422));
        assert_eq!(err.message, "matchKey unknown");
        assert!(!err.recoverable);
    }

    #[tokio::test]
    async fn server_error_without_body_uses_reason_phrase() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = uploader(&server.uri(), EndpointConfig::default())
            .upload(&submission(SubmissionType::SuperScouting))
            .await
            .unwrap_err();

        assert_eq!(err.message, "Service Unavailable");
        assert!(err.recoverable);
    }

    #[tokio::test]
    async fn unmapped_type_fails_without_a_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&server).await;
        let endpoints = EndpointConfig { pit_scouting: String::new(), ..EndpointConfig::default() };

        let err = uploader(&server.uri(), endpoints)
            .upload(&submission(SubmissionType::PitScouting))
            .await
            .unwrap_err();

        assert_eq!(err.kind, SyncErrorKind::Validation);
        assert!(!err.recoverable);
    }

    #[test]
    fn invalid_base_url_is_a_config_error() {
        let result = HttpSubmissionUploader::new(
            HttpClient::new().unwrap(),
            "not a url",
            EndpointConfig::default(),
        );
        assert!(matches!(result, Err(FieldSyncError::Config(_))));
    }
}
