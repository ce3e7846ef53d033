mod app;
mod config;
mod fuzzy;
mod models;
mod ops;
mod picker;
mod session;
mod storage;
mod tui;

use anyhow::Result;

use app::App;
use config::Config;
use session::Session;
use storage::StorageService;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("bucket-scout: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = Config::from_env()?;
    let gateway = if config.needs_credentials() {
        None
    } else {
        Some(StorageService::connect(&config).await?)
    };

    let session = Session::load();
    let mut app = App::new(config, gateway, session);
    app.seed_external_buckets();

    tui::run(&mut app).await?;

    let session = Session {
        sort: app.sort,
        show_hidden: app.session.show_hidden,
    };
    if let Err(err) = session.save() {
        eprintln!("bucket-scout: could not save session: {err:#}");
    }
    Ok(())
}
