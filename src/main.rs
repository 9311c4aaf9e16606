use std::sync::Arc;

use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::prelude::*;
use teloxide::update_listeners::webhooks;

use video_archive_bot::bot::{self, SessionState};
use video_archive_bot::catalog::Catalog;
use video_archive_bot::config::Config;
use video_archive_bot::rate_limit::RateLimiter;
use video_archive_bot::scheduler;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "info");
    }
    pretty_env_logger::init();
    log::info!("Starting video archive bot...");

    let config = match Config::from_env() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            log::error!("Configuration error: {e}");
            std::process::exit(1);
        }
    };
    log::info!("{} admin(s) configured", config.admin_ids.len());

    let catalog = match Catalog::connect(&config.database_url).await {
        Ok(catalog) => catalog,
        Err(e) => {
            log::error!("Could not open the archive database: {e}");
            std::process::exit(1);
        }
    };

    let limiter = RateLimiter::from_config(&config);
    let _cleanup = scheduler::spawn_daily_cleanup(
        catalog.clone(),
        limiter.clone(),
        config.history_retention_days,
    );

    let bot = Bot::new(config.bot_token.clone());

    let mut dispatcher = Dispatcher::builder(bot.clone(), bot::schema())
        .dependencies(dptree::deps![
            catalog,
            config.clone(),
            InMemStorage::<SessionState>::new(),
            limiter
        ])
        .default_handler(|upd| async move {
            log::debug!("Unhandled update: {:?}", upd.id);
        })
        .enable_ctrlc_handler()
        .build();

    match config.webhook_url.clone() {
        Some(url) => {
            log::info!("Receiving updates via webhook at {url}");
            let options = webhooks::Options::new(config.listen_addr(), url);
            let listener = match webhooks::axum(bot, options).await {
                Ok(listener) => listener,
                Err(e) => {
                    log::error!("Could not set up the webhook: {e}");
                    std::process::exit(1);
                }
            };
            dispatcher
                .dispatch_with_listener(
                    listener,
                    LoggingErrorHandler::with_custom_text("An error from the update listener"),
                )
                .await;
        }
        None => {
            log::info!("Receiving updates via long polling");
            dispatcher.dispatch().await;
        }
    }
}
