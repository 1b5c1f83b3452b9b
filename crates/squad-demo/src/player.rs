//! Player progression slice

use serde::{Deserialize, Serialize};
use state_stack::{typed_reducer, Reducer};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    pub xp: u64,
    pub xp_to_next_level: u64,
    pub level: u32,
}

impl Default for Player {
    fn default() -> Self {
        Self {
            name: "Rider".to_string(),
            xp: 0,
            xp_to_next_level: 100,
            level: 1,
        }
    }
}

/// Actions owned by the player slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum PlayerAction {
    #[serde(rename = "player/addXP")]
    AddXp(u64),
    #[serde(rename = "player/setName")]
    SetName(String),
    #[serde(rename = "player/reset")]
    Reset,
}

pub fn reducer() -> impl Reducer<Player> {
    typed_reducer(Player::default(), |player: &Arc<Player>, action: PlayerAction| match action {
        PlayerAction::AddXp(0) => Arc::clone(player),
        PlayerAction::AddXp(amount) => Arc::new(add_xp(player, amount)),
        PlayerAction::SetName(name) if name == player.name => Arc::clone(player),
        PlayerAction::SetName(name) => Arc::new(Player {
            name,
            ..(**player).clone()
        }),
        PlayerAction::Reset => Arc::new(Player::default()),
    })
}

/// Each level needs half again as much XP as the previous one.
fn add_xp(player: &Player, amount: u64) -> Player {
    let mut next = player.clone();
    next.xp += amount;
    while next.xp >= next.xp_to_next_level {
        next.xp -= next.xp_to_next_level;
        next.level += 1;
        next.xp_to_next_level = next.xp_to_next_level * 3 / 2;
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use state_stack::{Action, TypedAction};

    fn start() -> Arc<Player> {
        Arc::new(Player::default())
    }

    #[test]
    fn test_level_up_rolls_over() {
        let next = reducer()
            .reduce(Some(&start()), &Action::with_payload("player/addXP", 150))
            .unwrap();
        assert_eq!(
            (next.xp, next.xp_to_next_level, next.level),
            (50, 150, 2)
        );
    }

    #[test]
    fn test_multiple_levels_at_once() {
        let next = reducer()
            .reduce(Some(&start()), &PlayerAction::AddXp(260).to_action().unwrap())
            .unwrap();
        assert_eq!((next.xp, next.xp_to_next_level, next.level), (10, 225, 3));
    }

    #[test]
    fn test_no_op_actions_keep_identity() {
        let player = start();
        let reducer = reducer();
        for action in [
            PlayerAction::AddXp(0).to_action().unwrap(),
            PlayerAction::SetName("Rider".to_string()).to_action().unwrap(),
            Action::new("quests/add"),
        ] {
            let next = reducer.reduce(Some(&player), &action).unwrap();
            assert!(Arc::ptr_eq(&player, &next), "{} changed the player", action.kind);
        }
    }

    #[test]
    fn test_reducer_is_pure() {
        let player = start();
        let action = Action::with_payload("player/addXP", 40);
        let first = reducer().reduce(Some(&player), &action).unwrap();
        let second = reducer().reduce(Some(&player), &action).unwrap();
        assert_eq!(first, second);
        assert_eq!(*player, Player::default());
    }
}
