//! Public player-stats API rating source.
//!
//! `GET {base}/pub/player/{player}/stats` returns one object per rating pool,
//! e.g. `{"chess_blitz": {"last": {"rating": 1510, ...}, ...}, ...}`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use url::Url;

use super::{RatingSnapshot, RatingSource};
use crate::error::DataSourceError;
use crate::storage::GameMode;

pub const DEFAULT_BASE_URL: &str = "https://api.chess.com";

/// Latest rating per mode; modes the player never played are absent.
pub type ModeRatings = BTreeMap<String, i64>;

pub struct ChessComSource {
    client: reqwest::Client,
    base_url: Url,
}

impl ChessComSource {
    pub fn new() -> Result<Self, DataSourceError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Point at a different host (tests, mirrors).
    pub fn with_base_url(base_url: &str) -> Result<Self, DataSourceError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| DataSourceError::Request(format!("invalid base url: {e}")))?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("eloguard/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(DataSourceError::from)?;
        Ok(Self { client, base_url })
    }

    fn stats_url(&self, player: &str) -> Result<Url, DataSourceError> {
        let path = format!(
            "pub/player/{}/stats",
            urlencoding::encode(&player.trim().to_lowercase())
        );
        self.base_url
            .join(&path)
            .map_err(|e| DataSourceError::Request(e.to_string()))
    }

    async fn fetch_stats(&self, player: &str) -> Result<serde_json::Value, DataSourceError> {
        let url = self.stats_url(player)?;
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(DataSourceError::Status {
                status: resp.status().as_u16(),
            });
        }
        resp.json::<serde_json::Value>()
            .await
            .map_err(|e| DataSourceError::Decode(e.to_string()))
    }

    /// Ratings for every mode in one request.
    pub async fn fetch_all(&self, player: &str) -> Result<ModeRatings, DataSourceError> {
        let stats = self.fetch_stats(player).await?;
        Ok(GameMode::ALL
            .iter()
            .filter_map(|mode| last_rating(&stats, *mode).map(|r| (mode.to_string(), r)))
            .collect())
    }
}

fn last_rating(stats: &serde_json::Value, mode: GameMode) -> Option<i64> {
    stats
        .get(format!("chess_{mode}"))?
        .get("last")?
        .get("rating")?
        .as_i64()
        .filter(|r| *r > 0)
}

#[async_trait]
impl RatingSource for ChessComSource {
    async fn fetch_rating(
        &self,
        player: &str,
        mode: GameMode,
    ) -> Result<RatingSnapshot, DataSourceError> {
        let stats = self.fetch_stats(player).await?;
        let rating = last_rating(&stats, mode).ok_or_else(|| DataSourceError::NoRating {
            player: player.to_string(),
            mode,
        })?;
        Ok(RatingSnapshot::new(rating, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATS_BODY: &str = r#"{
        "chess_blitz": {"last": {"rating": 1510, "date": 1700000000, "rd": 45}},
        "chess_rapid": {"last": {"rating": 1620, "date": 1700000000, "rd": 60}},
        "chess_bullet": {"best": {"rating": 1400}}
    }"#;

    #[tokio::test]
    async fn fetch_rating_reads_last_rating_for_mode() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/pub/player/alice/stats")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(STATS_BODY)
            .create_async()
            .await;

        let source = ChessComSource::with_base_url(&server.url()).unwrap();
        let snapshot = source.fetch_rating("Alice", GameMode::Blitz).await.unwrap();

        assert_eq!(snapshot.rating, 1510);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_mode_is_no_rating() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/pub/player/alice/stats")
            .with_status(200)
            .with_body(STATS_BODY)
            .create_async()
            .await;

        let source = ChessComSource::with_base_url(&server.url()).unwrap();
        let err = source
            .fetch_rating("alice", GameMode::Bullet)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            DataSourceError::NoRating {
                player: "alice".into(),
                mode: GameMode::Bullet
            }
        );
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/pub/player/ghost/stats")
            .with_status(404)
            .create_async()
            .await;

        let source = ChessComSource::with_base_url(&server.url()).unwrap();
        let err = source
            .fetch_rating("ghost", GameMode::Blitz)
            .await
            .unwrap_err();
        assert_eq!(err, DataSourceError::Status { status: 404 });
    }

    #[tokio::test]
    async fn garbage_body_is_decode_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/pub/player/alice/stats")
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let source = ChessComSource::with_base_url(&server.url()).unwrap();
        let err = source
            .fetch_rating("alice", GameMode::Blitz)
            .await
            .unwrap_err();
        assert!(matches!(err, DataSourceError::Decode(_)));
    }

    #[tokio::test]
    async fn fetch_all_collects_every_played_mode() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/pub/player/alice/stats")
            .with_status(200)
            .with_body(STATS_BODY)
            .create_async()
            .await;

        let source = ChessComSource::with_base_url(&server.url()).unwrap();
        let all = source.fetch_all("alice").await.unwrap();

        assert_eq!(all.get("blitz"), Some(&1510));
        assert_eq!(all.get("rapid"), Some(&1620));
        assert!(!all.contains_key("bullet"));
        assert!(!all.contains_key("daily"));
    }
}
