use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::config::Config;
use crate::error::RemoteError;
use crate::remote::{
    AggregateBackend, AggregateKey, AggregateSubmission, AggregatedGameRecord, LastThree,
    WizardBackend,
};
use crate::wizard::{AttachmentRef, PendingAttachment, WizardProgress};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the hosted backend. Merge semantics live in the server-side
/// RPC functions; this type only marshals calls and maps failures.
pub struct HttpBackend {
    client: Client,
    base_url: String,
    api_key: String,
    access_token: Option<String>,
    bucket: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, api_key: &str, bucket: &str) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            access_token: None,
            bucket: bucket.to_string(),
        })
    }

    /// Client for the configured endpoint, signed in with the configured
    /// session token when there is one.
    pub fn from_config(config: &Config) -> Result<Self, RemoteError> {
        let backend = Self::new(&config.backend_url, &config.api_key, &config.upload_bucket)?;
        Ok(match config.access_token.as_deref() {
            Some(token) => backend.with_access_token(token),
            None => backend,
        })
    }

    /// Session token of the signed-in user; the API key is used otherwise.
    pub fn with_access_token(mut self, token: &str) -> Self {
        self.access_token = Some(token.to_string());
        self
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        request.header("apikey", &self.api_key).bearer_auth(bearer)
    }

    fn rpc<B: Serialize, T: DeserializeOwned>(
        &self,
        function: &str,
        body: &B,
    ) -> Result<T, RemoteError> {
        let url = format!("{}/rest/v1/rpc/{function}", self.base_url);
        tracing::debug!(%function, "remote call");
        let response = self
            .authorize(self.client.post(&url))
            .json(body)
            .send()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(RemoteError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json::<T>()
            .map_err(|e| RemoteError::Decode(format!("{function}: {e}")))
    }

    fn submission_body(submission: &AggregateSubmission) -> Value {
        json!({
            "p_user_id": submission.user_id,
            "p_module_id": submission.module_id,
            "p_level_number": submission.level_number,
            "p_game_mode_ids": submission.game_mode_ids,
            "p_score": submission.score,
            "p_is_completed": submission.is_completed,
            "p_time": submission.time,
            "p_total_terms": submission.total_terms,
            "p_placed_terms": submission.placed_terms,
        })
    }

    fn key_body(key: &AggregateKey, game_mode_id: &str) -> Value {
        json!({
            "p_user_id": key.user_id,
            "p_module_id": key.module_id,
            "p_level_number": key.level_number,
            "p_game_mode_id": game_mode_id,
        })
    }
}

impl AggregateBackend for HttpBackend {
    fn upsert_aggregate(
        &self,
        submission: &AggregateSubmission,
    ) -> Result<AggregatedGameRecord, RemoteError> {
        self.rpc("upsert_aggregate", &Self::submission_body(submission))
    }

    fn upsert_aggregate_with_history(
        &self,
        submission: &AggregateSubmission,
    ) -> Result<AggregatedGameRecord, RemoteError> {
        self.rpc(
            "upsert_aggregate_with_history",
            &Self::submission_body(submission),
        )
    }

    fn get_last_three_scores(
        &self,
        key: &AggregateKey,
        game_mode_id: &str,
    ) -> Result<LastThree, RemoteError> {
        self.rpc("get_last_three_scores", &Self::key_body(key, game_mode_id))
    }

    fn query_aggregate(
        &self,
        key: &AggregateKey,
    ) -> Result<Option<AggregatedGameRecord>, RemoteError> {
        self.rpc(
            "query_aggregate",
            &json!({
                "p_user_id": key.user_id,
                "p_module_id": key.module_id,
                "p_level_number": key.level_number,
            }),
        )
    }

    fn query_completed_game_mode_ids(
        &self,
        user_id: &str,
        module_id: &str,
    ) -> Result<Vec<String>, RemoteError> {
        let ids: Option<Vec<String>> = self.rpc(
            "query_completed_game_mode_ids",
            &json!({ "p_user_id": user_id, "p_module_id": module_id }),
        )?;
        Ok(ids.unwrap_or_default())
    }

    fn track_game_mode(
        &self,
        key: &AggregateKey,
        game_mode_id: &str,
    ) -> Result<AggregatedGameRecord, RemoteError> {
        self.rpc("track_game_mode", &Self::key_body(key, game_mode_id))
    }

    fn mark_completed(
        &self,
        key: &AggregateKey,
        game_mode_id: &str,
    ) -> Result<AggregatedGameRecord, RemoteError> {
        self.rpc("mark_completed", &Self::key_body(key, game_mode_id))
    }

    fn delete_aggregate(
        &self,
        user_id: &str,
        module_id: Option<&str>,
        game_mode_id: Option<&str>,
    ) -> Result<usize, RemoteError> {
        self.rpc(
            "delete_aggregate",
            &json!({
                "p_user_id": user_id,
                "p_module_id": module_id,
                "p_game_mode_id": game_mode_id,
            }),
        )
    }
}

impl WizardBackend for HttpBackend {
    fn load_progress(&self, user_id: &str) -> Result<Option<WizardProgress>, RemoteError> {
        self.rpc("load_wizard_progress", &json!({ "p_user_id": user_id }))
    }

    fn save_progress(&self, progress: &WizardProgress) -> Result<WizardProgress, RemoteError> {
        self.rpc("save_wizard_progress", &json!({ "p_progress": progress }))
    }

    fn upload_attachment(
        &self,
        user_id: &str,
        file: &PendingAttachment,
    ) -> Result<AttachmentRef, RemoteError> {
        let storage_path = format!("{user_id}/{}", file.file_name);
        let url = format!(
            "{}/storage/v1/object/{}/{storage_path}",
            self.base_url, self.bucket
        );
        let response = self
            .authorize(self.client.post(&url))
            .header("content-type", &file.content_type)
            .header("x-upsert", "true")
            .body(file.bytes.clone())
            .send()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Rejected {
                status: status.as_u16(),
                message: response.text().unwrap_or_default(),
            });
        }
        Ok(AttachmentRef {
            file_name: file.file_name.clone(),
            storage_path: format!("{}/{storage_path}", self.bucket),
            content_type: file.content_type.clone(),
            size_bytes: file.size(),
            uploaded_at: chrono::Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_loses_trailing_slash() {
        let backend = HttpBackend::new("https://example.test/", "key", "attachments").unwrap();
        assert_eq!(backend.base_url, "https://example.test");
    }

    #[test]
    fn submission_body_uses_rpc_parameter_names() {
        let body = HttpBackend::submission_body(&AggregateSubmission {
            user_id: "u1".into(),
            module_id: "eco".into(),
            level_number: 2,
            game_mode_ids: vec!["a".into()],
            score: 75,
            is_completed: true,
            time: 40,
            total_terms: 4,
            placed_terms: vec!["fox".into()],
        });
        assert_eq!(body["p_score"], 75);
        assert_eq!(body["p_level_number"], 2);
        assert_eq!(body["p_game_mode_ids"][0], "a");
    }

    fn bearer_of(backend: &HttpBackend) -> String {
        let request = backend
            .authorize(backend.client.post("https://example.test/rest/v1/rpc/noop"))
            .build()
            .unwrap();
        request.headers()["authorization"].to_str().unwrap().to_string()
    }

    #[test]
    fn session_token_from_config_is_the_bearer() {
        let mut config = Config::default();
        config.backend_url = "https://example.test".into();
        config.api_key = "anon-key".into();
        assert_eq!(bearer_of(&HttpBackend::from_config(&config).unwrap()), "Bearer anon-key");

        config.access_token = Some("session-token".into());
        let backend = HttpBackend::from_config(&config).unwrap();
        assert_eq!(bearer_of(&backend), "Bearer session-token");
    }
}
