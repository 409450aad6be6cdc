//! Last War reminder conversation.
//!
//! `/lw` opens a task menu and walks the user through kind → duration →
//! heads-up, then hands the result to the scheduler. Free text at the menu
//! goes through the natural-language interpreter instead. Each prompt that
//! carries buttons is "closed" once answered: the chosen value is appended
//! to the prompt message and its keyboard removed.

use std::sync::Arc;

use teloxide::dispatching::dialogue::{Dialogue, InMemStorage};
use teloxide::prelude::*;
use teloxide::types::{
    ChatId, InlineKeyboardButton, InlineKeyboardMarkup, MessageId, ParseMode, ReplyMarkup,
};
use teloxide::utils::markdown::escape;

use crate::data::Kind;
use crate::duration::{format_duration, parse_duration, parse_server_time_to_duration};
use crate::messages;
use crate::nl::Interpreter;
use crate::scheduler::{format_reminder_display, ReminderRequest, Scheduler};
use crate::Opt;

use super::DbState;

pub type LwDialogue = Dialogue<State, InMemStorage<State>>;

/// A sent prompt we may need to edit later. The raw MarkdownV2 text is kept
/// because Telegram only hands back the rendered plain text.
#[derive(Clone, Debug)]
pub struct StoredMsg {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub text: String,
}

/// Reminder under construction, before the duration is known.
#[derive(Clone, Debug)]
pub struct Draft {
    pub kind: Kind,
    pub task_name: Option<String>,
    pub prompt: StoredMsg,
}

/// Reminder under construction, waiting for the heads-up answer.
#[derive(Clone, Debug)]
pub struct HeadsUpDraft {
    pub kind: Kind,
    pub task_name: Option<String>,
    pub duration: chrono::Duration,
    pub prompt: StoredMsg,
}

#[derive(Clone, Default)]
pub enum State {
    #[default]
    Idle,
    Choosing { menu: StoredMsg },
    EnteringCustomTask { prompt: StoredMsg },
    EnteringDuration { draft: Draft },
    EnteringHeadsUp { draft: HeadsUpDraft },
}

/// Entry command: /lw — show the task selection menu.
pub async fn start(bot: Bot, msg: Message, dialogue: LwDialogue) -> anyhow::Result<()> {
    let keyboard = InlineKeyboardMarkup::new(vec![
        vec![
            InlineKeyboardButton::callback("🚚 Truck", "lw:truck"),
            InlineKeyboardButton::callback("🏗 Build", "lw:build"),
            InlineKeyboardButton::callback("🔬 Research", "lw:research"),
        ],
        vec![
            InlineKeyboardButton::callback("🪖 Train", "lw:train"),
            InlineKeyboardButton::callback("🏛 Ministry", "lw:ministry"),
            InlineKeyboardButton::callback("✏️ Custom", "lw:custom"),
        ],
        vec![
            InlineKeyboardButton::callback("📝 List", "lw:list"),
            InlineKeyboardButton::callback("🗑 Cancel", "lw:cancel"),
        ],
    ]);
    let menu = send_lw(
        &bot,
        msg.chat.id,
        escape(messages::LW_WELCOME),
        Some(keyboard),
    )
    .await?;
    dialogue.update(State::Choosing { menu }).await?;
    Ok(())
}

/// Task selected from the menu.
pub async fn on_choose(
    bot: Bot,
    q: CallbackQuery,
    dialogue: LwDialogue,
    menu: StoredMsg,
    db: DbState,
    scheduler: Scheduler,
    opt: Arc<Opt>,
) -> anyhow::Result<()> {
    let Some(data) = q.data.as_deref() else {
        return Ok(());
    };
    let Some(tag) = data.strip_prefix("lw:") else {
        return Ok(());
    };
    bot.answer_callback_query(q.id.clone()).await?;
    // Stale buttons from a previous prompt round.
    if tag.starts_with("dur:") || tag.starts_with("lead_time:") {
        return Ok(());
    }

    let user_id = q.from.id.0;
    let chat_id = menu.chat_id;

    match tag {
        "list" => {
            let menu = append_and_close(&bot, &menu, "List").await;
            let pending = db.lock().await.user_reminders(user_id, chat_id.0);
            let body = if pending.is_empty() {
                escape(messages::LW_LIST_EMPTY)
            } else {
                let lines: Vec<String> = pending
                    .iter()
                    .map(|r| format_reminder_display(r, opt.display_offset()))
                    .collect();
                escape(&format!("📝 Scheduled reminders:\n{}", lines.join("\n")))
            };
            send_lw(&bot, chat_id, body, None).await?;
            dialogue.update(State::Choosing { menu }).await?;
        }
        "cancel" => {
            let menu = append_and_close(&bot, &menu, "Cancel").await;
            let count = scheduler
                .cancel_user_reminders(&db, user_id, chat_id.0)
                .await?;
            send_lw(
                &bot,
                chat_id,
                escape(&format!("🗑 Cancelled {count} reminder(s).")),
                None,
            )
            .await?;
            dialogue.update(State::Choosing { menu }).await?;
        }
        _ => {
            let Ok(kind) = tag.parse::<Kind>() else {
                append_and_close(&bot, &menu, &escape("<unknown>")).await;
                dialogue.exit().await?;
                return Ok(());
            };
            append_and_close(&bot, &menu, &code(kind.label())).await;
            let next = match kind {
                Kind::Custom => ask_custom_task(&bot, chat_id).await?,
                Kind::Ministry => ask_server_time(&bot, chat_id).await?,
                _ => ask_duration(&bot, chat_id, kind, None).await?,
            };
            dialogue.update(next).await?;
        }
    }
    Ok(())
}

/// Custom task name typed by the user.
pub async fn on_custom_task(
    bot: Bot,
    msg: Message,
    dialogue: LwDialogue,
    prompt: StoredMsg,
) -> anyhow::Result<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    if text.starts_with('/') {
        return Ok(());
    }
    let title = text.trim().to_string();
    append_and_close(&bot, &prompt, &code(&title)).await;
    let next = ask_duration(&bot, msg.chat.id, Kind::Custom, Some(title)).await?;
    dialogue.update(next).await?;
    Ok(())
}

/// Duration picked from the quick-select buttons.
pub async fn on_duration_button(
    bot: Bot,
    q: CallbackQuery,
    dialogue: LwDialogue,
    draft: Draft,
) -> anyhow::Result<()> {
    let Some(value) = q.data.as_deref().and_then(|d| d.strip_prefix("lw:dur:")) else {
        return Ok(());
    };
    bot.answer_callback_query(q.id.clone()).await?;
    let chat_id = draft.prompt.chat_id;
    handle_duration_input(&bot, &dialogue, draft, chat_id, value).await
}

/// Duration (or, for ministry tasks, a server time) typed by the user.
pub async fn on_duration_text(
    bot: Bot,
    msg: Message,
    dialogue: LwDialogue,
    draft: Draft,
) -> anyhow::Result<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    if text.starts_with('/') {
        return Ok(());
    }
    handle_duration_input(&bot, &dialogue, draft, msg.chat.id, text.trim()).await
}

async fn handle_duration_input(
    bot: &Bot,
    dialogue: &LwDialogue,
    draft: Draft,
    chat_id: ChatId,
    raw: &str,
) -> anyhow::Result<()> {
    let parsed = if draft.kind == Kind::Ministry {
        parse_server_time_to_duration(raw)
    } else {
        parse_duration(raw)
    };
    let duration = match parsed {
        Ok(duration) => duration,
        Err(e) => {
            tracing::debug!("rejected duration input {raw:?}: {e}");
            let body = format!(
                "{}{}",
                escape(messages::LW_DURATION_ERROR),
                escape(&format!(". {}", messages::LW_DURATION_ERROR_EXAMPLE))
            );
            send_lw(bot, chat_id, body, None).await?;
            // Stay in the duration state for another try.
            return Ok(());
        }
    };

    append_and_close(bot, &draft.prompt, &code(&format_duration(duration))).await;
    let next = ask_heads_up(bot, chat_id, draft.kind, draft.task_name, duration).await?;
    dialogue.update(next).await?;
    Ok(())
}

/// Heads-up answered with a button (1m/3m/5m/skip).
pub async fn on_heads_up_button(
    bot: Bot,
    q: CallbackQuery,
    dialogue: LwDialogue,
    draft: HeadsUpDraft,
    db: DbState,
    scheduler: Scheduler,
) -> anyhow::Result<()> {
    let Some(value) = q
        .data
        .as_deref()
        .and_then(|d| d.strip_prefix("lw:lead_time:"))
    else {
        return Ok(());
    };
    bot.answer_callback_query(q.id.clone()).await?;
    let lead_time = (value != "skip").then(|| value.to_string());
    finish(&bot, &dialogue, draft, q.from.id.0, lead_time, &db, &scheduler).await
}

/// Heads-up typed by the user.
pub async fn on_heads_up_text(
    bot: Bot,
    msg: Message,
    dialogue: LwDialogue,
    draft: HeadsUpDraft,
    db: DbState,
    scheduler: Scheduler,
) -> anyhow::Result<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    if text.starts_with('/') {
        return Ok(());
    }
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let lead_time = Some(text.trim().to_string());
    finish(&bot, &dialogue, draft, user.id.0, lead_time, &db, &scheduler).await
}

/// Completes the conversation: closes the prompt, schedules, summarizes.
async fn finish(
    bot: &Bot,
    dialogue: &LwDialogue,
    draft: HeadsUpDraft,
    user_id: u64,
    lead_time: Option<String>,
    db: &DbState,
    scheduler: &Scheduler,
) -> anyhow::Result<()> {
    let chat_id = draft.prompt.chat_id;
    append_and_close(bot, &draft.prompt, &code(lead_time.as_deref().unwrap_or("No"))).await;

    let request = ReminderRequest {
        user_id,
        chat_id: chat_id.0,
        kind: draft.kind,
        task_name: draft.task_name.clone(),
        duration: draft.duration,
        lead_time: lead_time.clone(),
    };
    let (job_ids, label) = scheduler.schedule(db, &request).await?;
    tracing::info!("scheduled {} job(s) for {label}", job_ids.len());

    let task = match (draft.kind, &draft.task_name) {
        (Kind::Custom, Some(name)) if !name.is_empty() => capitalize(name),
        _ => draft.kind.label().to_string(),
    };
    let summary = format!(
        "✅ Scheduled\n• Task: {task}\n• Duration: {}\n• Heads-up: {}",
        format_duration(draft.duration),
        lead_time.as_deref().unwrap_or("None"),
    );
    send_lw(bot, chat_id, escape(&summary), None).await?;
    dialogue.exit().await?;
    Ok(())
}

/// Free text at the menu: try the natural-language interpreter.
pub async fn on_natural_text(
    bot: Bot,
    msg: Message,
    dialogue: LwDialogue,
    menu: StoredMsg,
    interpreter: Arc<Interpreter>,
) -> anyhow::Result<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    if text.starts_with('/') {
        return Ok(());
    }
    let chat_id = msg.chat.id;

    let parsed = match interpreter.interpret(text.trim()).await {
        Ok(Some(parsed)) => parsed,
        Ok(None) => {
            send_lw(&bot, chat_id, escape(messages::LW_NL_NOT_UNDERSTOOD), None).await?;
            return Ok(());
        }
        Err(e) => {
            let body = format!(
                "{}\n\n{}",
                escape("There was an error while processing your text:"),
                escape(&format!("{e:#}"))
            );
            send_lw(&bot, chat_id, body, None).await?;
            return Ok(());
        }
    };

    let kind = parsed.kind.unwrap_or(Kind::Custom);
    let task_name = Some(parsed.task_name.clone()).filter(|n| !n.is_empty());
    let label = task_name.clone().unwrap_or_else(|| kind.label().to_string());
    append_and_close(&bot, &menu, &code(&label)).await;

    // Kind and duration are already known, jump straight to the heads-up.
    let next = ask_heads_up(&bot, chat_id, kind, task_name, parsed.duration()).await?;
    dialogue.update(next).await?;
    Ok(())
}

/// /cancel — abort the conversation from any state.
pub async fn cancel(bot: Bot, msg: Message, dialogue: LwDialogue) -> anyhow::Result<()> {
    dialogue.exit().await?;
    bot.send_message(msg.chat.id, "Cancelled.").await?;
    Ok(())
}

// ---- prompts ----

async fn ask_duration(
    bot: &Bot,
    chat_id: ChatId,
    kind: Kind,
    task_name: Option<String>,
) -> anyhow::Result<State> {
    let keyboard = InlineKeyboardMarkup::new([[
        InlineKeyboardButton::callback("30m", "lw:dur:30m"),
        InlineKeyboardButton::callback("1h", "lw:dur:1h"),
        InlineKeyboardButton::callback("2h", "lw:dur:2h"),
    ]]);
    let body = format!(
        "{}\n_{}_",
        escape(messages::LW_DURATION_QUESTION),
        escape(messages::LW_DURATION_EXAMPLE)
    );
    let prompt = send_lw(bot, chat_id, body, Some(keyboard)).await?;
    Ok(State::EnteringDuration {
        draft: Draft {
            kind,
            task_name,
            prompt,
        },
    })
}

async fn ask_server_time(bot: &Bot, chat_id: ChatId) -> anyhow::Result<State> {
    let body = format!(
        "{}\n_{}_",
        escape(messages::LW_SERVER_TIME_ASK),
        escape(messages::LW_SERVER_TIME_EXAMPLE)
    );
    let prompt = send_lw(bot, chat_id, body, None).await?;
    Ok(State::EnteringDuration {
        draft: Draft {
            kind: Kind::Ministry,
            task_name: None,
            prompt,
        },
    })
}

async fn ask_custom_task(bot: &Bot, chat_id: ChatId) -> anyhow::Result<State> {
    let prompt = send_lw(bot, chat_id, escape(messages::LW_CUSTOM_TASK_ASK), None).await?;
    Ok(State::EnteringCustomTask { prompt })
}

async fn ask_heads_up(
    bot: &Bot,
    chat_id: ChatId,
    kind: Kind,
    task_name: Option<String>,
    duration: chrono::Duration,
) -> anyhow::Result<State> {
    let keyboard = InlineKeyboardMarkup::new(vec![
        vec![
            InlineKeyboardButton::callback("1m", "lw:lead_time:1m"),
            InlineKeyboardButton::callback("3m", "lw:lead_time:3m"),
            InlineKeyboardButton::callback("5m", "lw:lead_time:5m"),
        ],
        vec![InlineKeyboardButton::callback("No", "lw:lead_time:skip")],
    ]);
    let prompt = send_lw(
        bot,
        chat_id,
        escape(messages::LW_HEADS_UP_QUESTION),
        Some(keyboard),
    )
    .await?;
    Ok(State::EnteringHeadsUp {
        draft: HeadsUpDraft {
            kind,
            task_name,
            duration,
            prompt,
        },
    })
}

// ---- message plumbing ----

/// Sends a MarkdownV2 message under the bot header, remembering the wire
/// text so the message can be edited later.
async fn send_lw(
    bot: &Bot,
    chat_id: ChatId,
    body: String,
    keyboard: Option<InlineKeyboardMarkup>,
) -> anyhow::Result<StoredMsg> {
    let text = format!("*{}*\n\n{}", escape(messages::LW_HEADER), body);
    let mut send = bot.send_message(chat_id, text.clone());
    send.parse_mode = Some(ParseMode::MarkdownV2);
    if let Some(keyboard) = keyboard {
        send.reply_markup = Some(ReplyMarkup::InlineKeyboard(keyboard));
    }
    let sent = send.await?;
    Ok(StoredMsg {
        chat_id,
        message_id: sent.id,
        text,
    })
}

/// Appends a line to a stored prompt and drops its keyboard. Edit failures
/// (e.g. the message was deleted) are logged, not fatal.
async fn append_and_close(bot: &Bot, stored: &StoredMsg, line: &str) -> StoredMsg {
    let text = format!("{}\n\n{}", stored.text, line);
    let mut edit = bot.edit_message_text(stored.chat_id, stored.message_id, text.clone());
    edit.parse_mode = Some(ParseMode::MarkdownV2);
    if let Err(e) = edit.await {
        tracing::warn!("failed to close prompt message: {e}");
    }
    StoredMsg {
        chat_id: stored.chat_id,
        message_id: stored.message_id,
        text,
    }
}

/// Inline code span with MarkdownV2 escaping for its content.
fn code(s: &str) -> String {
    format!("`{}`", s.replace('\\', r"\\").replace('`', r"\`"))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_escapes_backticks_and_backslashes() {
        assert_eq!(code("2h"), "`2h`");
        assert_eq!(code("a`b"), r"`a\`b`");
        assert_eq!(code(r"a\b"), r"`a\\b`");
    }

    #[test]
    fn capitalize_first_letter_only() {
        assert_eq!(capitalize("truck"), "Truck");
        assert_eq!(capitalize("shield timer"), "Shield timer");
        assert_eq!(capitalize(""), "");
    }
}
