//! REST collaborators: matchmaking queue and in-game actions.
//!
//! Every endpoint answers with the [`ApiResponse`] envelope. Acknowledgements
//! carry no useful data; the authoritative result of an action arrives later
//! as a push on the session channel.

use std::time::Duration;

use async_trait::async_trait;
use chimonca_wire::{
    ApiResponse, BattleRequest, FieldBattleRequest, JoinQueueRequest, RoomId,
    SessionInfo, SubmitCardRequest, SurrenderRequest,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

/// REST failure.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum ApiError {
    /// The request never produced a response.
    #[display("Request failed: {}", _0)]
    Transport(#[error(not(source))] String),

    /// Non-success HTTP status.
    #[display("HTTP {} from {}", status, url)]
    Status {
        /// Status code.
        status: u16,
        /// Request URL.
        url: String,
    },

    /// The envelope reported a failure.
    #[display("Server rejected request: {}", _0)]
    Rejected(#[error(not(source))] String),

    /// The body did not match the expected shape.
    #[display("Invalid response: {}", _0)]
    Decode(#[error(not(source))] String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// The game server's REST surface.
#[async_trait]
pub trait GameApi: Send + Sync {
    /// Enters the matchmaking queue with the chosen deck.
    async fn join_queue(&self, request: &JoinQueueRequest) -> Result<(), ApiError>;

    /// Leaves the matchmaking queue. The caller is identified by its token.
    async fn leave_queue(&self) -> Result<(), ApiError>;

    /// Fetches the initial session snapshot as seen by the caller.
    async fn fetch_session(&self, room: RoomId) -> Result<SessionInfo, ApiError>;

    /// Places a hand card on the field.
    async fn submit_card(&self, room: RoomId, request: &SubmitCardRequest) -> Result<(), ApiError>;

    /// Resolves a pending battle pair.
    async fn request_battle(&self, room: RoomId, request: &BattleRequest) -> Result<(), ApiError>;

    /// Starts a field battle over the whole board.
    async fn field_battle(&self, room: RoomId, request: &FieldBattleRequest)
    -> Result<(), ApiError>;

    /// Concedes the game.
    async fn surrender(&self, room: RoomId, request: &SurrenderRequest) -> Result<(), ApiError>;
}

/// [`GameApi`] over HTTP with bearer authentication.
#[derive(Debug, Clone)]
pub struct RestGameApi {
    base_url: String,
    client: reqwest::Client,
    token: Option<String>,
}

impl RestGameApi {
    /// Creates a client for `base_url` (without trailing slash).
    #[instrument(skip(token), fields(base_url = %base_url))]
    pub fn new(base_url: String, token: Option<String>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        info!(authenticated = token.is_some(), "REST client ready");
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Sends a request and unwraps the envelope.
    async fn exchange<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<Option<T>, ApiError> {
        let response = self.authorize(builder).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, url, "Request failed");
            return Err(ApiError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let text = response.text().await?;
        debug!(url, body = %text, "Response");
        let envelope: ApiResponse<T> =
            serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))?;
        if !envelope.is_ok() {
            warn!(status = envelope.status, message = %envelope.message, "Envelope rejected");
            return Err(ApiError::Rejected(envelope.message));
        }
        Ok(envelope.data)
    }

    async fn post_ack<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), ApiError> {
        let url = self.url(path);
        self.exchange::<serde_json::Value>(self.client.post(&url).json(body), &url)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl GameApi for RestGameApi {
    #[instrument(skip(self, request), fields(player = %request.player_id, cards = request.card_ids.len()))]
    async fn join_queue(&self, request: &JoinQueueRequest) -> Result<(), ApiError> {
        self.post_ack("game/matching/join", request).await?;
        info!("Joined matchmaking queue");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn leave_queue(&self) -> Result<(), ApiError> {
        let url = self.url("game/matching/cancel");
        self.exchange::<serde_json::Value>(self.client.delete(&url), &url)
            .await?;
        info!("Left matchmaking queue");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn fetch_session(&self, room: RoomId) -> Result<SessionInfo, ApiError> {
        let url = self.url(&format!("game/{room}"));
        let info = self
            .exchange::<SessionInfo>(self.client.get(&url), &url)
            .await?
            .ok_or_else(|| ApiError::Decode("session response without data".into()))?;
        debug!(
            hand = info.my_hand_cards.len(),
            turn = %info.current_turn_player_id,
            "Fetched session"
        );
        Ok(info)
    }

    #[instrument(skip(self, request), fields(card = %request.game_card_id))]
    async fn submit_card(&self, room: RoomId, request: &SubmitCardRequest) -> Result<(), ApiError> {
        self.post_ack(&format!("game/{room}/submit-card"), request).await
    }

    #[instrument(skip(self, request), fields(card1 = %request.game_card_id1, card2 = %request.game_card_id2))]
    async fn request_battle(&self, room: RoomId, request: &BattleRequest) -> Result<(), ApiError> {
        self.post_ack(&format!("game/{room}/battle"), request).await
    }

    #[instrument(skip(self, request))]
    async fn field_battle(
        &self,
        room: RoomId,
        request: &FieldBattleRequest,
    ) -> Result<(), ApiError> {
        self.post_ack(&format!("game/{room}/field-battle"), request).await
    }

    #[instrument(skip(self, request))]
    async fn surrender(&self, room: RoomId, request: &SurrenderRequest) -> Result<(), ApiError> {
        self.post_ack(&format!("game/{room}/surrender"), request).await
    }
}
