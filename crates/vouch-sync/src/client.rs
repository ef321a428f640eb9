use reqwest::{Client, RequestBuilder, multipart};
use serde::de::DeserializeOwned;
use serde_json::json;

use vouch_types::api::{
    CreateChallengeRequest, ErrorBody, LoginRequest, MESSAGES_REVISION_HEADER,
    PostMessageRequest, PostMessageResponse, RegisterRequest, UploadResponse, UsernameResponse,
};
use vouch_types::models::{
    Challenge, ChallengeId, ChallengeStatus, Message, MessageId, MessageSnapshot, Notification,
    NotificationId, User, UserId,
};

use crate::error::ClientError;

/// The calls [`Session`](crate::Session) reconciles against.
#[allow(async_fn_in_trait)]
pub trait ChallengeApi {
    async fn list_challenges(&self, user_id: UserId) -> Result<Vec<Challenge>, ClientError>;
    async fn create_challenge(&self, req: &CreateChallengeRequest) -> Result<Challenge, ClientError>;
    async fn update_status(
        &self,
        challenge_id: ChallengeId,
        status: ChallengeStatus,
    ) -> Result<Challenge, ClientError>;
    async fn reassign_coach(
        &self,
        challenge_id: ChallengeId,
        coach_id: UserId,
    ) -> Result<Challenge, ClientError>;
    async fn archive(&self, challenge_id: ChallengeId) -> Result<Challenge, ClientError>;
    async fn delete_challenge(&self, challenge_id: ChallengeId) -> Result<(), ClientError>;

    /// Full list with the revision it was read at.
    async fn list_messages(&self, challenge_id: ChallengeId) -> Result<MessageSnapshot, ClientError>;
    /// The stored message and the list it was committed into.
    async fn post_message(
        &self,
        challenge_id: ChallengeId,
        req: &PostMessageRequest,
    ) -> Result<(Message, MessageSnapshot), ClientError>;
    async fn set_proof(&self, message_id: MessageId, is_proof: bool) -> Result<Message, ClientError>;
    async fn validate(&self, message_id: MessageId, is_validated: bool) -> Result<Message, ClientError>;
    async fn mark_read(
        &self,
        challenge_id: ChallengeId,
        user_id: UserId,
    ) -> Result<MessageSnapshot, ClientError>;

    async fn notifications(&self, user_id: UserId) -> Result<Vec<Notification>, ClientError>;
    async fn mark_notification_read(&self, id: NotificationId) -> Result<Notification, ClientError>;
}

/// HTTP client for a Vouch server, e.g. `ApiClient::new("http://127.0.0.1:3000")`.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ClientError> {
        let resp = check(req.send().await?).await?;
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Like `send`, also reading the list revision header.
    async fn send_with_revision<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
    ) -> Result<(T, i64), ClientError> {
        let resp = check(req.send().await?).await?;
        let revision = resp
            .headers()
            .get(MESSAGES_REVISION_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .ok_or(ClientError::MissingRevision(MESSAGES_REVISION_HEADER))?;
        let bytes = resp.bytes().await?;
        Ok((serde_json::from_slice(&bytes)?, revision))
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<User, ClientError> {
        let body = RegisterRequest {
            username: username.into(),
            password: password.into(),
        };
        self.send(self.http.post(self.url("/api/register")).json(&body))
            .await
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<User, ClientError> {
        let body = LoginRequest {
            username: username.into(),
            password: password.into(),
        };
        self.send(self.http.post(self.url("/api/login")).json(&body))
            .await
    }

    pub async fn list_users(&self) -> Result<Vec<User>, ClientError> {
        self.send(self.http.get(self.url("/api/users"))).await
    }

    pub async fn username(&self, user_id: UserId) -> Result<String, ClientError> {
        let resp: UsernameResponse = self
            .send(
                self.http
                    .get(self.url("/api/users/username"))
                    .query(&[("user_id", user_id)]),
            )
            .await?;
        Ok(resp.username)
    }

    /// Upload an image; the returned `image_url` goes into a message.
    pub async fn upload_image(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        mime_type: &str,
    ) -> Result<UploadResponse, ClientError> {
        let part = multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime_type)?;
        let form = multipart::Form::new().part("image", part);
        self.send(self.http.post(self.url("/api/upload")).multipart(form))
            .await
    }
}

/// Turn a non-2xx response into [`ClientError::Status`], keeping the
/// server's `{error}` text when there is one.
async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    let error = serde_json::from_str::<ErrorBody>(&text)
        .map(|b| b.error)
        .unwrap_or_else(|_| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
    Err(ClientError::Status {
        code: status.as_u16(),
        error,
    })
}

impl ChallengeApi for ApiClient {
    async fn list_challenges(&self, user_id: UserId) -> Result<Vec<Challenge>, ClientError> {
        self.send(
            self.http
                .get(self.url("/api/challenges"))
                .query(&[("user_id", user_id)]),
        )
        .await
    }

    async fn create_challenge(&self, req: &CreateChallengeRequest) -> Result<Challenge, ClientError> {
        self.send(self.http.post(self.url("/api/challenges")).json(req))
            .await
    }

    async fn update_status(
        &self,
        challenge_id: ChallengeId,
        status: ChallengeStatus,
    ) -> Result<Challenge, ClientError> {
        let url = self.url(&format!("/api/challenges/{}/status", challenge_id));
        self.send(self.http.put(url).json(&json!({ "status": status })))
            .await
    }

    async fn reassign_coach(
        &self,
        challenge_id: ChallengeId,
        coach_id: UserId,
    ) -> Result<Challenge, ClientError> {
        let url = self.url(&format!("/api/challenges/{}/coach", challenge_id));
        self.send(self.http.put(url).json(&json!({ "coachId": coach_id })))
            .await
    }

    async fn archive(&self, challenge_id: ChallengeId) -> Result<Challenge, ClientError> {
        let url = self.url(&format!("/api/challenges/{}/archive", challenge_id));
        self.send(self.http.put(url)).await
    }

    async fn delete_challenge(&self, challenge_id: ChallengeId) -> Result<(), ClientError> {
        let url = self.url(&format!("/api/challenges/{}", challenge_id));
        check(self.http.delete(url).send().await?).await?;
        Ok(())
    }

    async fn list_messages(&self, challenge_id: ChallengeId) -> Result<MessageSnapshot, ClientError> {
        let url = self.url(&format!("/api/challenges/{}/messages", challenge_id));
        let (messages, revision) = self.send_with_revision(self.http.get(url)).await?;
        Ok(MessageSnapshot {
            challenge_id,
            revision,
            messages,
        })
    }

    async fn post_message(
        &self,
        challenge_id: ChallengeId,
        req: &PostMessageRequest,
    ) -> Result<(Message, MessageSnapshot), ClientError> {
        let url = self.url(&format!("/api/challenges/{}/messages", challenge_id));
        let (resp, revision): (PostMessageResponse, _) =
            self.send_with_revision(self.http.post(url).json(req)).await?;
        let snapshot = MessageSnapshot {
            challenge_id,
            revision,
            messages: resp.messages,
        };
        Ok((resp.message, snapshot))
    }

    async fn set_proof(&self, message_id: MessageId, is_proof: bool) -> Result<Message, ClientError> {
        let url = self.url(&format!("/api/messages/{}/set-proof", message_id));
        self.send(self.http.put(url).json(&json!({ "isProof": is_proof })))
            .await
    }

    async fn validate(&self, message_id: MessageId, is_validated: bool) -> Result<Message, ClientError> {
        let url = self.url(&format!("/api/messages/{}/validate", message_id));
        self.send(self.http.put(url).json(&json!({ "isValidated": is_validated })))
            .await
    }

    async fn mark_read(
        &self,
        challenge_id: ChallengeId,
        user_id: UserId,
    ) -> Result<MessageSnapshot, ClientError> {
        let url = self.url(&format!("/api/challenges/{}/messages/read", challenge_id));
        let (messages, revision) = self
            .send_with_revision(self.http.put(url).json(&json!({ "user_id": user_id })))
            .await?;
        Ok(MessageSnapshot {
            challenge_id,
            revision,
            messages,
        })
    }

    async fn notifications(&self, user_id: UserId) -> Result<Vec<Notification>, ClientError> {
        self.send(
            self.http
                .get(self.url("/api/notifications"))
                .query(&[("user_id", user_id)]),
        )
        .await
    }

    async fn mark_notification_read(&self, id: NotificationId) -> Result<Notification, ClientError> {
        let url = self.url(&format!("/api/notifications/{}/read", id));
        self.send(self.http.put(url)).await
    }
}
