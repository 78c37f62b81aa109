use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Geographic region a player competes from.
///
/// `Global` is the default and doubles as "no region" in query filters: a
/// filter asking for `Global` matches players from every region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Region {
    /// No specific region; matches everywhere in filters.
    #[default]
    Global,
    /// North America.
    Na,
    /// Europe.
    Eu,
    /// Asia.
    Asia,
    /// South America.
    Sa,
    /// Oceania.
    Oce,
}

impl Region {
    /// Lowercase token used inside broadcast channel names.
    pub fn channel_token(&self) -> &'static str {
        match self {
            Region::Global => "global",
            Region::Na => "na",
            Region::Eu => "eu",
            Region::Asia => "asia",
            Region::Sa => "sa",
            Region::Oce => "oce",
        }
    }

    /// Wire-format label, matching the serialized representation.
    pub fn label(&self) -> &'static str {
        match self {
            Region::Global => "GLOBAL",
            Region::Na => "NA",
            Region::Eu => "EU",
            Region::Asia => "ASIA",
            Region::Sa => "SA",
            Region::Oce => "OCE",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.channel_token())
    }
}

/// Game mode a player is currently queued for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum GameMode {
    /// Unranked default queue.
    #[default]
    Casual,
    /// Competitive ladder play.
    Ranked,
    /// Short-timer matches.
    Blitz,
    /// Bracketed tournament play.
    Tournament,
    /// Matches that never touch the ladder.
    Practice,
}

impl GameMode {
    /// Lowercase token used inside broadcast channel names.
    pub fn channel_token(&self) -> &'static str {
        match self {
            GameMode::Casual => "casual",
            GameMode::Ranked => "ranked",
            GameMode::Blitz => "blitz",
            GameMode::Tournament => "tournament",
            GameMode::Practice => "practice",
        }
    }

    /// Wire-format label, matching the serialized representation.
    pub fn label(&self) -> &'static str {
        match self {
            GameMode::Casual => "CASUAL",
            GameMode::Ranked => "RANKED",
            GameMode::Blitz => "BLITZ",
            GameMode::Tournament => "TOURNAMENT",
            GameMode::Practice => "PRACTICE",
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.channel_token())
    }
}

/// Achievement unlocked by a player, with the moment it was earned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AchievementEntity {
    /// Stable achievement name (e.g. `first-win`).
    pub name: String,
    /// When the achievement was unlocked.
    pub unlocked_at: SystemTime,
}

/// Durable player record owned by the score store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerEntity {
    /// Primary key of the player.
    pub id: Uuid,
    /// Unique display name (2-30 chars, alphanumeric/hyphen/underscore).
    pub name: String,
    /// Region the player competes from.
    pub region: Region,
    /// Game mode the player currently plays.
    pub game_mode: GameMode,
    /// Current score on the global leaderboard.
    pub score: u32,
    /// Total number of recorded game results.
    pub games_played: u32,
    /// Derived field: `round(score / max(games_played, 1))`, recomputed on
    /// every score write. Deliberately divides the *current* score, not a
    /// running sum of historical scores.
    pub average_score: u32,
    /// High-water mark, `max(best_score, score)` re-established on every write.
    pub best_score: u32,
    /// Whether the player has a live connection right now.
    pub online: bool,
    /// Last time the player did anything score- or presence-related.
    pub last_active: SystemTime,
    /// Win counter from recorded game results.
    pub wins: u32,
    /// Loss counter from recorded game results.
    pub losses: u32,
    /// Draw counter from recorded game results.
    pub draws: u32,
    /// Unlocked achievements in unlock order.
    pub achievements: Vec<AchievementEntity>,
    /// Creation timestamp for auditing/debugging.
    pub created_at: SystemTime,
    /// Last time this record was written.
    pub updated_at: SystemTime,
}

impl PlayerEntity {
    /// Build a fresh player record with zeroed counters.
    pub fn new(name: String, region: Region, game_mode: GameMode) -> Self {
        let now = SystemTime::now();
        Self {
            id: Uuid::new_v4(),
            name,
            region,
            game_mode,
            score: 0,
            games_played: 0,
            average_score: 0,
            best_score: 0,
            online: false,
            last_active: now,
            wins: 0,
            losses: 0,
            draws: 0,
            achievements: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a score write and re-establish the derived fields.
    ///
    /// Every durable score mutation funnels through here so `best_score`
    /// stays a high-water mark and `average_score` follows its single
    /// documented formula.
    pub fn write_score(&mut self, score: u32) {
        let now = SystemTime::now();
        self.score = score;
        self.best_score = self.best_score.max(score);
        self.average_score = compute_average(score, self.games_played);
        self.last_active = now;
        self.updated_at = now;
    }

    /// True when the player already unlocked the named achievement.
    pub fn has_achievement(&self, name: &str) -> bool {
        self.achievements.iter().any(|a| a.name == name)
    }

    /// Unlock an achievement unless it is already present.
    pub fn unlock_achievement(&mut self, name: &str) {
        if !self.has_achievement(name) {
            self.achievements.push(AchievementEntity {
                name: name.to_owned(),
                unlocked_at: SystemTime::now(),
            });
        }
    }
}

/// Rounded integer division used for the average-score derived field.
fn compute_average(score: u32, games_played: u32) -> u32 {
    let games = u64::from(games_played.max(1));
    let score = u64::from(score);
    ((score + games / 2) / games) as u32
}

/// Lifecycle status of a multiplayer session. Transitions are monotonic:
/// `Waiting -> Active -> Completed`, with `Abandoned` terminal from either
/// non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Open for players, below the activation threshold.
    Waiting,
    /// Being played.
    Active,
    /// Ended normally with a settled scoreboard. Terminal.
    Completed,
    /// Every active participant left before completion. Terminal.
    Abandoned,
}

/// Difficulty knob carried in the session settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// Relaxed rules.
    Easy,
    /// Standard rules.
    #[default]
    Normal,
    /// Punishing rules.
    Hard,
}

/// Match rules captured when the session is created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Optional wall-clock limit for the match, in seconds.
    pub time_limit_secs: Option<u32>,
    /// Optional score at which the match ends.
    pub score_limit: Option<u32>,
    /// Difficulty selected for the match.
    pub difficulty: Difficulty,
}

/// One participant slot inside a session, preserved even after leaving.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantEntity {
    /// Player occupying the slot.
    pub player_id: Uuid,
    /// Display name snapshotted at join time.
    pub name: String,
    /// Durable score the player had when joining.
    pub score_at_join: u32,
    /// In-session score, overwritten by each score update (last write wins).
    pub score: u32,
    /// Final position assigned once the session completes.
    pub final_position: Option<u32>,
    /// False once the player left; the slot stays for history.
    pub active: bool,
}

/// Append-only session event log entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionEventEntity {
    /// When the event happened.
    pub at: SystemTime,
    /// Typed event payload.
    #[serde(flatten)]
    pub kind: SessionEventKind,
}

/// Closed set of session event kinds, each with its own payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SessionEventKind {
    /// A player took a participant slot.
    PlayerJoined { player_id: Uuid, name: String },
    /// A participant was soft-removed.
    PlayerLeft { player_id: Uuid },
    /// The session crossed the activation threshold and started.
    GameStarted { player_count: u32 },
    /// A participant's in-session score was overwritten.
    ScoreChanged {
        player_id: Uuid,
        score: u32,
        delta: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// The session completed with this final scoreboard.
    GameEnded { scoreboard: Vec<FinalStanding> },
}

/// One line of the final scoreboard recorded by the game-ended event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct FinalStanding {
    pub player_id: Uuid,
    pub name: String,
    /// In-session score before the positional bonus.
    pub score: u32,
    /// 1-based final position.
    pub position: u32,
    /// Positional bonus added to the durable score.
    pub bonus: u32,
}

/// Transient multiplayer match, persisted by the score store but distinct
/// from the durable leaderboard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionEntity {
    /// Primary key of the session.
    pub id: Uuid,
    /// Participant slots in join order. Join order is what makes the final
    /// tie-break stable.
    pub participants: Vec<ParticipantEntity>,
    /// Game mode played in this session.
    pub game_mode: GameMode,
    /// Region the session is hosted for.
    pub region: Region,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Maximum number of participant slots.
    pub max_players: u32,
    /// Match rules.
    pub settings: SessionSettings,
    /// Append-only event log.
    pub events: Vec<SessionEventEntity>,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Set when the session auto-activates.
    pub started_at: Option<SystemTime>,
    /// Set exactly once, when the session completes.
    pub ended_at: Option<SystemTime>,
    /// `ended_at - started_at`, set together with `ended_at`.
    pub duration_secs: Option<u64>,
}

impl SessionEntity {
    /// Build a session in the `Waiting` state with no participants.
    pub fn new(
        game_mode: GameMode,
        region: Region,
        max_players: u32,
        settings: SessionSettings,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            participants: Vec::new(),
            game_mode,
            region,
            status: SessionStatus::Waiting,
            max_players,
            settings,
            events: Vec::new(),
            created_at: SystemTime::now(),
            started_at: None,
            ended_at: None,
            duration_secs: None,
        }
    }

    /// Number of participants that have not left.
    pub fn active_count(&self) -> usize {
        self.participants.iter().filter(|p| p.active).count()
    }

    /// Whether every participant slot is taken.
    pub fn is_full(&self) -> bool {
        self.participants.len() as u32 >= self.max_players
    }

    /// Look up a participant slot by player.
    pub fn participant(&self, player_id: Uuid) -> Option<&ParticipantEntity> {
        self.participants.iter().find(|p| p.player_id == player_id)
    }

    /// Mutable participant lookup.
    pub fn participant_mut(&mut self, player_id: Uuid) -> Option<&mut ParticipantEntity> {
        self.participants
            .iter_mut()
            .find(|p| p.player_id == player_id)
    }

    /// Append a typed event stamped with the current time.
    pub fn push_event(&mut self, kind: SessionEventKind) {
        self.events.push(SessionEventEntity {
            at: SystemTime::now(),
            kind,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_score_keeps_best_score_monotonic() {
        let mut player = PlayerEntity::new("tester".into(), Region::Eu, GameMode::Ranked);
        player.write_score(1500);
        assert_eq!(player.best_score, 1500);
        player.write_score(900);
        assert_eq!(player.score, 900);
        assert_eq!(player.best_score, 1500);
    }

    #[test]
    fn average_divides_current_score_by_games_played() {
        // The formula intentionally discards score history: it is the
        // current score over the games counter, not a running average.
        let mut player = PlayerEntity::new("tester".into(), Region::Na, GameMode::Casual);
        player.games_played = 3;
        player.write_score(1000);
        assert_eq!(player.average_score, 333);

        // Zero games divides by one instead.
        player.games_played = 0;
        player.write_score(1000);
        assert_eq!(player.average_score, 1000);
    }

    #[test]
    fn achievements_unlock_once() {
        let mut player = PlayerEntity::new("tester".into(), Region::Na, GameMode::Casual);
        player.unlock_achievement("first-win");
        player.unlock_achievement("first-win");
        assert_eq!(player.achievements.len(), 1);
    }

    #[test]
    fn active_count_ignores_departed_participants() {
        let mut session =
            SessionEntity::new(GameMode::Blitz, Region::Eu, 4, SessionSettings::default());
        session.participants.push(ParticipantEntity {
            player_id: Uuid::new_v4(),
            name: "a".into(),
            score_at_join: 0,
            score: 0,
            final_position: None,
            active: true,
        });
        session.participants.push(ParticipantEntity {
            player_id: Uuid::new_v4(),
            name: "b".into(),
            score_at_join: 0,
            score: 0,
            final_position: None,
            active: false,
        });
        assert_eq!(session.active_count(), 1);
    }
}
