use mongodb::bson::{Binary, DateTime, Document, doc, spec::BinarySubtype};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{
    AchievementEntity, GameMode, ParticipantEntity, PlayerEntity, Region, SessionEntity,
    SessionEventEntity, SessionEventKind, SessionSettings, SessionStatus,
};
use crate::dao::score_store::PlayerFilter;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPlayerDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    name: String,
    region: Region,
    game_mode: GameMode,
    score: u32,
    games_played: u32,
    average_score: u32,
    best_score: u32,
    online: bool,
    last_active: DateTime,
    wins: u32,
    losses: u32,
    draws: u32,
    achievements: Vec<MongoAchievementDocument>,
    created_at: DateTime,
    updated_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoAchievementDocument {
    name: String,
    unlocked_at: DateTime,
}

impl From<PlayerEntity> for MongoPlayerDocument {
    fn from(value: PlayerEntity) -> Self {
        Self {
            id: value.id,
            name: value.name,
            region: value.region,
            game_mode: value.game_mode,
            score: value.score,
            games_played: value.games_played,
            average_score: value.average_score,
            best_score: value.best_score,
            online: value.online,
            last_active: DateTime::from_system_time(value.last_active),
            wins: value.wins,
            losses: value.losses,
            draws: value.draws,
            achievements: value
                .achievements
                .into_iter()
                .map(|a| MongoAchievementDocument {
                    name: a.name,
                    unlocked_at: DateTime::from_system_time(a.unlocked_at),
                })
                .collect(),
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl From<MongoPlayerDocument> for PlayerEntity {
    fn from(value: MongoPlayerDocument) -> Self {
        Self {
            id: value.id,
            name: value.name,
            region: value.region,
            game_mode: value.game_mode,
            score: value.score,
            games_played: value.games_played,
            average_score: value.average_score,
            best_score: value.best_score,
            online: value.online,
            last_active: value.last_active.to_system_time(),
            wins: value.wins,
            losses: value.losses,
            draws: value.draws,
            achievements: value
                .achievements
                .into_iter()
                .map(|a| AchievementEntity {
                    name: a.name,
                    unlocked_at: a.unlocked_at.to_system_time(),
                })
                .collect(),
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSessionDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    participants: Vec<ParticipantEntity>,
    game_mode: GameMode,
    region: Region,
    status: SessionStatus,
    max_players: u32,
    settings: SessionSettings,
    events: Vec<MongoSessionEventDocument>,
    created_at: DateTime,
    started_at: Option<DateTime>,
    ended_at: Option<DateTime>,
    duration_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSessionEventDocument {
    at: DateTime,
    #[serde(flatten)]
    kind: SessionEventKind,
}

impl From<SessionEntity> for MongoSessionDocument {
    fn from(value: SessionEntity) -> Self {
        Self {
            id: value.id,
            participants: value.participants,
            game_mode: value.game_mode,
            region: value.region,
            status: value.status,
            max_players: value.max_players,
            settings: value.settings,
            events: value
                .events
                .into_iter()
                .map(|e| MongoSessionEventDocument {
                    at: DateTime::from_system_time(e.at),
                    kind: e.kind,
                })
                .collect(),
            created_at: DateTime::from_system_time(value.created_at),
            started_at: value.started_at.map(DateTime::from_system_time),
            ended_at: value.ended_at.map(DateTime::from_system_time),
            duration_secs: value.duration_secs,
        }
    }
}

impl From<MongoSessionDocument> for SessionEntity {
    fn from(value: MongoSessionDocument) -> Self {
        Self {
            id: value.id,
            participants: value.participants,
            game_mode: value.game_mode,
            region: value.region,
            status: value.status,
            max_players: value.max_players,
            settings: value.settings,
            events: value
                .events
                .into_iter()
                .map(|e| SessionEventEntity {
                    at: e.at.to_system_time(),
                    kind: e.kind,
                })
                .collect(),
            created_at: value.created_at.to_system_time(),
            started_at: value.started_at.map(|d| d.to_system_time()),
            ended_at: value.ended_at.map(|d| d.to_system_time()),
            duration_secs: value.duration_secs,
        }
    }
}

fn uuid_as_binary(id: Uuid) -> Binary {
    Binary {
        subtype: BinarySubtype::Uuid,
        bytes: id.into_bytes().to_vec(),
    }
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": uuid_as_binary(id)}
}

/// Translate a [`PlayerFilter`] into a MongoDB match document. The filter
/// constructor already erased `Global`, so every present constraint maps to
/// a plain conjunction clause.
pub fn filter_document(filter: &PlayerFilter) -> Document {
    let mut document = Document::new();
    if let Some(region) = filter.region {
        document.insert("region", region.label());
    }
    if let Some(mode) = filter.game_mode {
        document.insert("game_mode", mode.label());
    }
    if filter.online_only {
        document.insert("online", true);
    }
    if let Some(after) = filter.active_after {
        document.insert(
            "last_active",
            doc! {"$gt": DateTime::from_system_time(after)},
        );
    }
    if let Some(score) = filter.score_above {
        document.insert("score", doc! {"$gt": i64::from(score)});
    }
    document
}
