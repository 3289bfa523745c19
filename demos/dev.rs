//! Fundbox dev server, seeds a sample event and prints role tokens.

use clap::Parser;
use fundbox::{
    auth::{JwtToken, Role},
    *,
};
use migration::{Migrator, MigratorTrait};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

/// Cli
#[derive(Debug, Parser)]
#[command(name = "fundbox", about = "fundbox dev server.", version)]
pub struct Cli {
    /// config file path
    #[arg(short = 'c', value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// fresh db
    #[arg(short = 'f')]
    pub fresh: bool,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "INFO");
    }
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let args = Cli::parse();
    let state: AppState = AppState::create(args.config, Some("FUNDBOX".to_string())).await?;
    if args.fresh {
        Migrator::fresh(state.service.db()).await?;
    } else {
        Migrator::up(state.service.db(), None).await?;
    }

    if state.service.list_events().await?.is_empty() {
        let event = state
            .service
            .create_event(NewEvent::new(
                "Bakti Sosial Mahasiswa",
                "Penggalangan dana untuk kegiatan bakti sosial di desa binaan.",
                &json!(2_000_000),
                "user_abc123".to_owned(),
            )?)
            .await?;
        info!("Seed event {} {}", event.id, event.title);
    }

    let (secret, expiry) = {
        let setting = state.setting.read();
        (setting.auth.secret.clone(), setting.auth.token_expiry)
    };
    let admin = JwtToken::generate("dev_admin", Role::Admin, expiry, secret.as_bytes())?;
    let organizer =
        JwtToken::generate("user_abc123", Role::Organizer, expiry, secret.as_bytes())?;
    info!("admin token: {}", admin);
    info!("organizer token: {}", organizer);

    start(state).await?;
    Ok(())
}
