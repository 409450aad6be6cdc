use std::sync::Arc;

use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::dispatching::{dialogue, UpdateHandler};
use teloxide::prelude::*;
use tokio::sync::Mutex;

use crate::data::Database;

pub mod duolingo;
pub mod lastwar;

use lastwar::State;

pub type DbState = Arc<Mutex<Database>>;

#[derive(teloxide::utils::command::BotCommands, Clone, Debug)]
#[command(
    rename_rule = "lowercase",
    description = "These commands are supported:"
)]
pub enum Command {
    #[command(description = "Duolingo helper menu")]
    Duolingo,
    #[command(description = "Schedule a Last War reminder")]
    Lw,
    #[command(description = "Cancel the current conversation")]
    Cancel,
}

pub fn schema() -> UpdateHandler<anyhow::Error> {
    use dptree::case;

    let command_handler = teloxide::filter_command::<Command, anyhow::Result<()>>()
        .branch(case![Command::Duolingo].endpoint(duolingo::menu))
        .branch(case![Command::Lw].endpoint(lastwar::start))
        .branch(case![Command::Cancel].endpoint(lastwar::cancel));

    let message_handler = Update::filter_message()
        .branch(command_handler)
        .branch(case![State::Choosing { menu }].endpoint(lastwar::on_natural_text))
        .branch(case![State::EnteringCustomTask { prompt }].endpoint(lastwar::on_custom_task))
        .branch(case![State::EnteringDuration { draft }].endpoint(lastwar::on_duration_text))
        .branch(case![State::EnteringHeadsUp { draft }].endpoint(lastwar::on_heads_up_text));

    let callback_handler = Update::filter_callback_query()
        .branch(
            dptree::filter(|q: CallbackQuery| {
                q.data.as_deref().map_or(false, |data| data.starts_with("duo:"))
            })
            .endpoint(duolingo::on_button),
        )
        .branch(case![State::Choosing { menu }].endpoint(lastwar::on_choose))
        .branch(case![State::EnteringDuration { draft }].endpoint(lastwar::on_duration_button))
        .branch(case![State::EnteringHeadsUp { draft }].endpoint(lastwar::on_heads_up_button));

    dialogue::enter::<Update, InMemStorage<State>, State, _>()
        .branch(message_handler)
        .branch(callback_handler)
}
