use std::sync::Arc;

use teloxide::{dptree::deps, prelude::*, RequestError};

use crate::{config::Config, database::Database, handlers};

/// # Panics
/// Panics if the config is broken or the database won't come up.
/// No point starting otherwise.
pub async fn entry() {
    let config = Arc::new(Config::from_env());

    let bot = Bot::new(&config.key);

    let database = Database::new(&config.db_url)
        .await
        .expect("Could not init the database!");

    log::info!("Creating the handler...");

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handlers::handle_message))
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback_query))
        .endpoint(|| async { Ok::<(), RequestError>(()) }); // bye lol

    log::info!("Dispatching the dispatcher!");

    Dispatcher::builder(bot, handler)
        .default_handler(|_| async {})
        .dependencies(deps![database, config])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    log::info!("it appears we have been bonked.");
}
