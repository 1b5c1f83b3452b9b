//! Store wiring for the squad demo

use crate::player::{self, Player, PlayerAction};
use crate::quests::{self, QuestStatus};
use serde_json::{json, Value};
use state_stack::{
    apply_middleware, combine_reducers, create_store, Action, ApiCall, ApiClient, ApiMiddleware,
    BatchMiddleware, CombinedState, Dispatched, Dispatcher, LoggerMiddleware, Middleware, Result,
    StackConfig, Store, StoreError, Thunk, ThunkMiddleware, TypedAction,
};
use std::sync::Arc;
use std::time::Duration;

pub const PLAYER: &str = "player";

/// XP granted per completed quest.
pub const QUEST_REWARD: u64 = 100;

pub struct App {
    pub store: Store<CombinedState>,
    pub history: Arc<LoggerMiddleware<CombinedState>>,
}

impl App {
    pub fn new(config: &StackConfig, client: impl ApiClient + 'static) -> Result<Self> {
        let root = combine_reducers()
            .with_config(&config.store)
            .slice(PLAYER, player::reducer())
            .slice(quests::SLICE, quests::slice().reducer())
            .build()?;

        let history = Arc::new(
            LoggerMiddleware::from_config(&config.logger)
                .with_filter(|action| !action.kind.ends_with("Request")),
        );
        let middlewares: Vec<Arc<dyn Middleware<CombinedState>>> = vec![
            Arc::new(ThunkMiddleware),
            Arc::new(BatchMiddleware),
            Arc::new(ApiMiddleware::from_config(client, &config.api)),
            history.clone(),
        ];
        let store = create_store(root, None, Some(apply_middleware(middlewares)))?;

        Ok(Self { store, history })
    }

    pub fn player(&self) -> Result<Arc<Player>> {
        self.store
            .get_state()?
            .slice::<Player>(PLAYER)
            .ok_or_else(|| StoreError::SliceTypeMismatch(PLAYER.to_string()))
    }

    /// Load the quest catalog through the API middleware.
    pub async fn fetch_quests(&self) -> Result<usize> {
        let fetch = ApiCall::new("/quests")
            .types("quests/fetchRequest", "quests/fetchSuccess", "quests/fetchFailure")
            .to_action("quests/fetch")?;
        let response = self.store.dispatch(fetch)?.resolve().await?;
        Ok(response.as_array().map_or(0, Vec::len))
    }

    /// Complete several steps of one quest as a single batch.
    pub fn complete_steps(&self, id: &str, steps: impl IntoIterator<Item = usize>) -> Result<()> {
        let actions = steps
            .into_iter()
            .map(|step| Action::with_payload("quests/progressStep", json!({ "id": id, "step": step })))
            .collect();
        let _ = self.store.dispatch(Action::batch(actions))?;
        Ok(())
    }
}

/// Grant XP for every completed quest; returns how many were rewarded.
pub fn award_completed_quests() -> Thunk<CombinedState> {
    Thunk::new("award_completed_quests", |dispatch: Dispatcher<CombinedState>, get_state| {
        let state = get_state.get()?;
        let completed = quests::selectors()
            .select_all(&state)
            .iter()
            .filter(|quest| quest.status == QuestStatus::Completed)
            .count();
        if completed > 0 {
            let _ = dispatch.dispatch(PlayerAction::AddXp(QUEST_REWARD * completed as u64).to_action()?)?;
        }
        Ok(Dispatched::Value(json!(completed)))
    })
}

/// Grant a bonus after a short delay.
pub fn daily_bonus(amount: u64, delay: Duration) -> Thunk<CombinedState> {
    Thunk::from_async("daily_bonus", move |dispatch: Dispatcher<CombinedState>, _| async move {
        tokio::time::sleep(delay).await;
        let _ = dispatch.dispatch(PlayerAction::AddXp(amount).to_action()?)?;
        Ok::<Value, StoreError>(json!(amount))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use state_stack::{FnApiClient, Selector};

    fn catalog() -> impl ApiClient {
        FnApiClient::new(|_call: ApiCall| {
            std::future::ready(Ok(json!([
                {
                    "id": "ride",
                    "title": "First ride",
                    "steps": [{ "title": "Charge" }, { "title": "Ride 5km" }],
                    "status": "Active"
                },
                {
                    "id": "jump",
                    "title": "Big jump",
                    "steps": [{ "title": "Find a ramp" }],
                    "status": "Available"
                }
            ])))
        })
    }

    #[tokio::test]
    async fn test_full_session() {
        let app = App::new(&StackConfig::default(), catalog()).unwrap();

        assert_eq!(app.fetch_quests().await.unwrap(), 2);
        app.complete_steps("ride", [0, 1]).unwrap();

        let rewarded = app.store.dispatch(award_completed_quests()).unwrap();
        assert_eq!(rewarded.resolve().await.unwrap(), json!(1));
        app.store
            .dispatch(daily_bonus(60, Duration::from_millis(1)))
            .unwrap()
            .resolve()
            .await
            .unwrap();

        let player = app.player().unwrap();
        assert_eq!((player.level, player.xp), (2, 60));

        let open = quests::select_open();
        let state = app.store.get_state().unwrap();
        let open: Vec<String> = open.select(&state, &()).iter().map(|q| q.id.clone()).collect();
        assert_eq!(open, vec!["jump".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_store_usable() {
        let failing = FnApiClient::new(|_call: ApiCall| async {
            Err::<Value, _>(anyhow::anyhow!("catalog offline"))
        });
        let app = App::new(&StackConfig::default(), failing).unwrap();

        assert!(matches!(app.fetch_quests().await, Err(StoreError::Effect(_))));
        let _ = app.store.dispatch(PlayerAction::AddXp(10).to_action().unwrap()).unwrap();
        assert_eq!(app.player().unwrap().xp, 10);
    }

    #[tokio::test]
    async fn test_history_skips_request_actions() {
        let app = App::new(&StackConfig::default(), catalog()).unwrap();
        app.fetch_quests().await.unwrap();

        let kinds: Vec<String> = app.history.entries().into_iter().map(|e| e.action.kind).collect();
        assert_eq!(kinds, vec!["quests/fetchSuccess".to_string()]);
    }
}
