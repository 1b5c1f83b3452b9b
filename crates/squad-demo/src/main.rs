use serde_json::{json, Value};
use state_stack::{ApiCall, FnApiClient, Selector, StackConfig};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

mod app;
mod player;
mod quests;

use app::App;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting squad-demo");

    let config = StackConfig::load();
    let app = App::new(&config, FnApiClient::new(quest_catalog))?;

    let store = app.store.clone();
    let levels = Mutex::new(app.player()?.level);
    let subscription = app.store.subscribe(move || {
        let Ok(state) = store.get_state() else {
            return;
        };
        let Some(player) = state.slice::<player::Player>(app::PLAYER) else {
            return;
        };
        let mut seen = levels.lock().unwrap_or_else(PoisonError::into_inner);
        if player.level != *seen {
            log::info!("{} reached level {}", player.name, player.level);
            *seen = player.level;
        }
    })?;

    let loaded = app.fetch_quests().await?;
    log::info!("Loaded {} quests", loaded);

    app.complete_steps("first-ride", [0, 1, 2])?;
    let rewarded = app.store.dispatch(app::award_completed_quests())?.resolve().await?;
    log::info!("Rewarded {} completed quests", rewarded);

    app.store
        .dispatch(app::daily_bonus(40, Duration::from_millis(50)))?
        .resolve()
        .await?;

    subscription.unsubscribe()?;

    let state = app.store.get_state()?;
    let player = app.player()?;
    let open = quests::select_open().select(&state, &());
    println!(
        "{} | level {} | xp {}/{} | open quests: {}",
        player.name,
        player.level,
        player.xp,
        player.xp_to_next_level,
        open.iter().map(|q| q.title.as_str()).collect::<Vec<_>>().join(", ")
    );
    log::info!("Recorded {} actions", app.history.entries().len());

    Ok(())
}

/// Offline stand-in for the quest catalog endpoint.
async fn quest_catalog(call: ApiCall) -> anyhow::Result<Value> {
    log::debug!("{} {}", call.method, call.url);
    tokio::time::sleep(Duration::from_millis(20)).await;
    Ok(json!([
        {
            "id": "first-ride",
            "title": "First ride",
            "steps": [
                { "title": "Charge the battery" },
                { "title": "Check tyre pressure" },
                { "title": "Ride 5km" }
            ],
            "status": "Active"
        },
        {
            "id": "big-jump",
            "title": "Big jump",
            "steps": [{ "title": "Find a ramp" }, { "title": "Land it" }],
            "status": "Available"
        }
    ]))
}
