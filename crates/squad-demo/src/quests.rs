//! Quest log slice, backed by an entity adapter

use serde::{Deserialize, Serialize};
use state_stack::{
    create_filter_selector, CombinedState, EntityAdapter, EntitySelectors, EntityState, Selector,
    Slice, SliceBuilder, Update,
};
use std::sync::Arc;

pub const SLICE: &str = "quests";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestStatus {
    Available,
    Active,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub title: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quest {
    pub id: String,
    pub title: String,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub progress: u8,
    pub status: QuestStatus,
}

pub type Quests = EntityState<Quest>;

#[derive(Debug, Deserialize)]
struct ProgressStep {
    id: String,
    step: usize,
}

/// Quests ordered by title.
pub fn adapter() -> EntityAdapter<Quest> {
    EntityAdapter::new(|quest: &Quest| quest.id.clone()).sorted_by(|a, b| a.title.cmp(&b.title))
}

pub fn slice() -> Slice<Quests> {
    let adapter = adapter();
    let add = adapter.clone();
    let loaded = adapter.clone();
    let status = adapter.clone();
    let remove = adapter;

    SliceBuilder::new(SLICE, Quests::default())
        .case_with_payload("add", move |quests: &Arc<Quests>, quest: Quest| add.add_one(quests, quest))
        .case_with_payload("fetchSuccess", move |quests: &Arc<Quests>, all: Vec<Quest>| {
            loaded.set_all(quests, all)
        })
        .case_with_payload("progressStep", progress_step)
        .case_with_payload("updateQuestStatus", move |quests: &Arc<Quests>, update: Update| {
            status.update_one_json(quests, &update).unwrap_or_else(|e| {
                log::warn!("Ignoring status update: {}", e);
                Arc::clone(quests)
            })
        })
        .case_with_payload("remove", move |quests: &Arc<Quests>, id: String| remove.remove_one(quests, &id))
        .build()
}

/// Mark one step done and recompute progress; completing the last step
/// completes the quest. Steps that are already done are ignored.
fn progress_step(quests: &Arc<Quests>, request: ProgressStep) -> Arc<Quests> {
    let pending = quests
        .get(&request.id)
        .and_then(|quest| quest.steps.get(request.step))
        .is_some_and(|step| !step.completed);
    if !pending {
        return Arc::clone(quests);
    }

    adapter().update_one(quests, &request.id, |quest| {
        let mut next = quest.clone();
        next.steps[request.step].completed = true;
        let done = next.steps.iter().filter(|step| step.completed).count();
        next.progress = (done * 100 / next.steps.len()) as u8;
        next.status = if done == next.steps.len() {
            QuestStatus::Completed
        } else {
            QuestStatus::Active
        };
        next
    })
}

/// Entity selectors over the `quests` slice of a combined state.
pub fn selectors() -> EntitySelectors<CombinedState, Quest, String> {
    adapter().get_selectors_for(|state: &CombinedState| {
        state.slice::<Quests>(SLICE).unwrap_or_default()
    })
}

/// Quests not yet completed, memoized on the quest collection.
pub fn select_open() -> impl Selector<CombinedState, (), Output = Arc<Vec<Quest>>> {
    let quests = selectors();
    create_filter_selector(
        move |state: &CombinedState, _: &()| quests.select_all(state),
        |quest: &Quest| quest.status != QuestStatus::Completed,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use state_stack::{Action, Reducer};

    fn ride() -> Quest {
        Quest {
            id: "ride".to_string(),
            title: "First ride".to_string(),
            steps: vec![
                Step {
                    title: "Charge the battery".to_string(),
                    completed: false,
                },
                Step {
                    title: "Ride 5km".to_string(),
                    completed: false,
                },
            ],
            progress: 0,
            status: QuestStatus::Active,
        }
    }

    fn with_ride() -> (Slice<Quests>, Arc<Quests>) {
        let slice = slice();
        let action = slice.action("add").unwrap().create(ride()).unwrap();
        let state = slice.reducer().reduce(None, &action).unwrap();
        (slice, state)
    }

    #[test]
    fn test_progress_steps_complete_quest() {
        let (slice, state) = with_ride();
        let reducer = slice.reducer();
        let step = |n: usize| {
            slice
                .action("progressStep")
                .unwrap()
                .create(json!({ "id": "ride", "step": n }))
                .unwrap()
        };

        let state = reducer.reduce(Some(&state), &step(0)).unwrap();
        assert_eq!(state.get(&"ride".to_string()).unwrap().progress, 50);

        let state = reducer.reduce(Some(&state), &step(1)).unwrap();
        let quest = state.get(&"ride".to_string()).unwrap();
        assert_eq!(quest.progress, 100);
        assert_eq!(quest.status, QuestStatus::Completed);

        let again = reducer.reduce(Some(&state), &step(1)).unwrap();
        assert!(Arc::ptr_eq(&state, &again));
    }

    #[test]
    fn test_update_status_from_changes_payload() {
        let (slice, state) = with_ride();
        let action = Action::with_payload(
            "quests/updateQuestStatus",
            json!({ "id": "ride", "changes": { "status": "Available" } }),
        );
        let state = slice.reducer().reduce(Some(&state), &action).unwrap();
        assert_eq!(state.get(&"ride".to_string()).unwrap().status, QuestStatus::Available);
    }

    #[test]
    fn test_bad_status_is_ignored() {
        let (slice, state) = with_ride();
        let action = Action::with_payload(
            "quests/updateQuestStatus",
            json!({ "id": "ride", "changes": { "status": "Lost" } }),
        );
        let next = slice.reducer().reduce(Some(&state), &action).unwrap();
        assert!(Arc::ptr_eq(&state, &next));
    }

    #[test]
    fn test_fetch_success_replaces_and_sorts() {
        let (slice, state) = with_ride();
        let mut jump = ride();
        jump.id = "jump".to_string();
        jump.title = "Big jump".to_string();
        let action = Action::with_payload("quests/fetchSuccess", json!([ride(), jump]));

        let state = slice.reducer().reduce(Some(&state), &action).unwrap();
        assert_eq!(state.ids, vec!["jump".to_string(), "ride".to_string()]);
    }

    #[test]
    fn test_remove_missing_quest_is_noop() {
        let (slice, state) = with_ride();
        let action = slice.action("remove").unwrap().create("ghost").unwrap();
        let next = slice.reducer().reduce(Some(&state), &action).unwrap();
        assert!(Arc::ptr_eq(&state, &next));
    }
}
