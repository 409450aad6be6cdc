//! User-facing message texts for both bots.

use rand::seq::SliceRandom;

// Duolingo bot
pub const DUOLINGO_WELCOME: &str = "🦉 Duolingo Bot\n\nWhat would you like to do?";
pub const NOTIFYING_LOADING: &str = "⏳ Notifying your friends...";
pub const NOTIFICATION_SUCCESS: &str =
    "🔔 Notification sent successfully!\n\nYour friends have been notified. Keep up the great work! 🎉";
pub const NOTIFICATION_FAILED: &str = "❌ Failed to notify friends. Please try again later.";

// Last War bot
pub const LW_HEADER: &str = "⚔️ Last War Bot";
pub const LW_WELCOME: &str = "What would you like to be reminded about?";
pub const LW_DURATION_QUESTION: &str = "When should the reminder go off?";
pub const LW_DURATION_EXAMPLE: &str = "(e.g. 2h, 1h30m, or tap below)";
pub const LW_DURATION_ERROR: &str = "The duration you sent is not valid";
pub const LW_DURATION_ERROR_EXAMPLE: &str = "Please, try formats like 2h, 1d7:04, or 30m.";
pub const LW_HEADS_UP_QUESTION: &str = "Heads-up before start?";
pub const LW_SERVER_TIME_ASK: &str = "Inform the server time shown in-game:";
pub const LW_SERVER_TIME_EXAMPLE: &str = "(e.g., 8-11-2025 17:09 or 17:09)";
pub const LW_CUSTOM_TASK_ASK: &str = "Inform the task name:";
pub const LW_LIST_EMPTY: &str = "📝 No reminders scheduled.";
pub const LW_NL_NOT_UNDERSTOOD: &str = "I couldn't understand that. Please, try again.";

const DUOLINGO_REMINDERS: &[&str] = &[
    "Sobrevivi ao Duolingo de hoje! E você, já fez a sua lição ou vai deixar a coruja nervosa?",
    "A lição de hoje foi difícil, mas a ofensiva tá viva! 🧠🔥 Já garantiu a sua também?",
    "Duolingo feito com sucesso ✅ A coruja sorriu. E aí, vai deixar ela decepcionada hoje?",
    "Quase perdi a ofensiva, mas dei o gás no final! 🏃‍♂️🔥 Já fez a sua parte ou vai arriscar?",
    "🦉 Missão do dia cumprida! Agora é sua vez... Não me decepciona 😏",
    "Mais um dia de aprendizado, mais um dia salvo da fúria da coruja. 🕊️ E você, já estudou hoje?",
    "Se eu consegui fazer Duolingo hoje, você também consegue! 💪 Bora manter essa ofensiva viva!",
    "Já fiz minha parte no Duolingo. Agora é com vocês! 👀 Não vão quebrar a sequência hein!",
    "🧩 Duolingo do dia concluído! E você, já alimentou sua corujinha hoje?",
    "A lição de hoje quase me quebrou… mas a ofensiva tá salva 😮‍💨 Já garantiu a sua?",
];

/// A random Portuguese streak reminder to forward to the friends webhook.
pub fn random_duolingo_reminder() -> &'static str {
    DUOLINGO_REMINDERS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(DUOLINGO_REMINDERS[0])
}
