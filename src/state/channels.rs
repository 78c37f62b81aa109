//! Broadcast channel naming.
//!
//! Every connection lands in a deterministic set of channels derived from its
//! (region, game mode) pair. Join, subscribe, and unsubscribe all derive the
//! set through the same function so memberships round-trip exactly.

use crate::dao::models::{GameMode, Region};

/// Channel every connection joins.
pub const GLOBAL_CHANNEL: &str = "global";

/// Derive the channel set for a (region, game mode) pair.
///
/// Always `global`; `region:{r}` when the region is concrete; `gamemode:{m}`
/// when a mode is given; and the conjunction channel when both are present.
pub fn generate_channels(region: Region, game_mode: Option<GameMode>) -> Vec<String> {
    let mut channels = vec![GLOBAL_CHANNEL.to_owned()];

    if region != Region::Global {
        channels.push(format!("region:{region}"));
    }
    if let Some(mode) = game_mode {
        channels.push(format!("gamemode:{mode}"));
        if region != Region::Global {
            channels.push(format!("region:{region}:gamemode:{mode}"));
        }
    }

    channels
}

/// Transport-level room for one session's live audience.
pub fn session_channel(session_id: uuid::Uuid) -> String {
    format!("session:{session_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_region_only_gets_the_global_channel() {
        assert_eq!(generate_channels(Region::Global, None), vec!["global"]);
    }

    #[test]
    fn concrete_region_adds_region_channel() {
        assert_eq!(
            generate_channels(Region::Eu, None),
            vec!["global", "region:eu"]
        );
    }

    #[test]
    fn mode_without_region_skips_the_conjunction() {
        assert_eq!(
            generate_channels(Region::Global, Some(GameMode::Ranked)),
            vec!["global", "gamemode:ranked"]
        );
    }

    #[test]
    fn region_and_mode_produce_all_four() {
        assert_eq!(
            generate_channels(Region::Na, Some(GameMode::Blitz)),
            vec![
                "global",
                "region:na",
                "gamemode:blitz",
                "region:na:gamemode:blitz"
            ]
        );
    }
}
