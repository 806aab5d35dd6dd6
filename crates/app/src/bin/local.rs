// ThiCode chat core - local exchange runner
//
// Usage: local [prompt...]

use tracing::{error, info};
use uuid::Uuid;

use thicode_common::config::Config;
use thicode_common::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    logging::init(&config.rust_log, config.log_format);

    info!("Starting ThiCode local exchange runner");

    let pool = thicode_app::connect_database(&config).await.map_err(|e| {
        error!("Failed to connect to database: {}", e);
        e
    })?;

    sqlx::migrate!("../../migrations").run(&pool).await?;
    info!("Database ready");

    let services = thicode_app::create_services(pool).await.map_err(|e| {
        error!("Failed to create services: {}", e);
        e
    })?;

    let prompt = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    let prompt = if prompt.trim().is_empty() {
        "Hello! What can you help me with?".to_string()
    } else {
        prompt
    };

    let exchange = services
        .chat
        .start_conversation(Uuid::new_v4(), prompt)
        .await?;

    info!(
        conversation_id = %exchange.conversation.id,
        title = %exchange.conversation.title,
        "Exchange stored"
    );
    println!("{}", exchange.assistant_message.content);

    Ok(())
}
