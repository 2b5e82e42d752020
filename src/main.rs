use tokio_util::sync::CancellationToken;

mod components;
mod config;

fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .filter_module("codec_store", log::LevelFilter::Debug)
        .filter_module("codec_stored", log::LevelFilter::Debug)
        .init();
}

#[tokio::main]
async fn main() -> ! {
    init_logging();
    let config = config::load().unwrap_or_else(|e| {
        eprintln!("Error loading store config: {:#}", e);
        std::process::exit(1);
    });

    let store = codec_store::ComponentStore::builder()
        .config(config)
        .add_module(components::PassthroughModule::audio())
        .add_module(components::PassthroughModule::video())
        .build()
        .and_then(codec_store::store::install)
        .unwrap_or_else(|e| {
            eprintln!("Error building component store: {:#}", e);
            std::process::exit(1);
        });

    match store.list_components().await {
        Ok(traits) => {
            for t in traits {
                match serde_json::to_string(&t) {
                    Ok(json) => log::info!("component: {}", json),
                    Err(e) => log::error!("serialize traits of {}: {}", t.name, e),
                }
            }
        }
        Err(e) => log::error!("list components: {}", e),
    }

    let cancel = CancellationToken::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            },
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
            },
        }
    }

    log::info!("store {} shutting down", store.name());
    std::process::exit(0);
}
