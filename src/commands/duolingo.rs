//! Duolingo streak helper: one menu, one button, one webhook call.

use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, ReplyMarkup};

use crate::messages;
use crate::webhook::WebhookNotifier;

pub async fn menu(bot: Bot, msg: Message) -> anyhow::Result<()> {
    let keyboard = InlineKeyboardMarkup::new([[InlineKeyboardButton::callback(
        "Notify Friends",
        "duo:notify",
    )]]);
    let mut send = bot.send_message(msg.chat.id, messages::DUOLINGO_WELCOME);
    send.reply_to_message_id = Some(msg.id);
    send.reply_markup = Some(ReplyMarkup::InlineKeyboard(keyboard));
    send.await?;
    Ok(())
}

pub async fn on_button(bot: Bot, q: CallbackQuery, notifier: WebhookNotifier) -> anyhow::Result<()> {
    let Some(message) = q.message.as_ref() else {
        return Ok(());
    };
    bot.answer_callback_query(q.id.clone()).await?;
    if q.data.as_deref() != Some("duo:notify") {
        return Ok(());
    }

    bot.edit_message_text(message.chat.id, message.id, messages::NOTIFYING_LOADING)
        .await?;
    let reminder = messages::random_duolingo_reminder();
    let ok = notifier
        .post(&serde_json::json!({ "message": reminder }))
        .await;
    let reply = if ok {
        messages::NOTIFICATION_SUCCESS
    } else {
        messages::NOTIFICATION_FAILED
    };
    bot.send_message(message.chat.id, reply).await?;
    Ok(())
}
