use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::FixedOffset;
use clap::Parser;
use reqwest::Url;
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::error_handlers::LoggingErrorHandler;
use teloxide::prelude::*;
use teloxide::update_listeners::webhooks;
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

mod commands;
mod data;
mod duration;
mod messages;
mod nl;
mod scheduler;
mod webhook;

use commands::lastwar::State;
use data::Database;
use nl::Interpreter;
use webhook::WebhookNotifier;

#[derive(Parser, Clone, Debug)]
#[command(version, about = "Telegram bot with Duolingo nudges and Last War reminders")]
pub struct Opt {
    /// Telegram bot API token.
    #[arg(long, env = "BOT_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Address to bind the webhook listener to.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Public URL Telegram should deliver updates to. Long polling is used
    /// when unset.
    #[arg(long, env = "TELEGRAM_WEBHOOK_URL")]
    pub webhook_url: Option<Url>,

    /// Outbound webhook for Duolingo friend notifications.
    #[arg(long, env = "DUOLINGO_WEBHOOK_URL")]
    pub duolingo_webhook: Option<String>,

    /// Outbound webhook mirroring fired Last War reminders.
    #[arg(long, env = "LASTWAR_WEBHOOK_URL")]
    pub lastwar_webhook: Option<String>,

    /// OpenAI API key; natural-language input is disabled without it.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4.1-mini")]
    pub openai_model: String,

    /// Reminder persistence file.
    #[arg(long, env = "REMINDBOT_DATABASE", default_value = "remindbot.json")]
    pub database: PathBuf,

    /// UTC offset in hours used when displaying reminder times.
    #[arg(
        long,
        env = "DISPLAY_UTC_OFFSET",
        default_value_t = -3,
        allow_negative_numbers = true
    )]
    pub display_utc_offset: i8,
}

impl Opt {
    pub fn display_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(i32::from(self.display_utc_offset) * 3600)
            .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let opt = Opt::parse();

    let db = Database::open(&opt.database)
        .with_context(|| format!("failed to open database {}", opt.database.display()))?;
    let db = Arc::new(Mutex::new(db));

    let bot = Bot::new(&opt.token);
    let me = bot.get_me().await.context("failed to reach Telegram")?;
    tracing::info!("running as @{}", me.username());

    let lastwar_notifier = WebhookNotifier::new(opt.lastwar_webhook.clone());
    let duolingo_notifier = WebhookNotifier::new(opt.duolingo_webhook.clone());
    let sched = scheduler::start(bot.clone(), db.clone(), lastwar_notifier);

    let interpreter = Arc::new(Interpreter::new(
        opt.openai_api_key.clone(),
        opt.openai_model.clone(),
    ));
    if !interpreter.enabled() {
        tracing::warn!("no OpenAI API key, natural-language input disabled");
    }

    let mut dispatcher = Dispatcher::builder(bot.clone(), commands::schema())
        .dependencies(dptree::deps![
            InMemStorage::<State>::new(),
            db,
            sched,
            interpreter,
            duolingo_notifier,
            Arc::new(opt.clone()),
            me
        ])
        .enable_ctrlc_handler()
        .build();

    match &opt.webhook_url {
        Some(url) => {
            let addr = SocketAddr::new(opt.host, opt.port);
            tracing::info!("listening for updates on {addr}, public URL {url}");
            let listener = webhooks::axum(bot, webhooks::Options::new(addr, url.clone()))
                .await
                .context("failed to set up the webhook listener")?;
            dispatcher
                .dispatch_with_listener(
                    listener,
                    LoggingErrorHandler::with_custom_text("error from the update listener"),
                )
                .await;
        }
        None => {
            tracing::info!("no webhook URL, falling back to long polling");
            dispatcher.dispatch().await;
        }
    }

    Ok(())
}
