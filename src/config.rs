use codec_store::StoreConfig;

/// Path of a JSON `StoreConfig`; unset means defaults.
pub const CONFIG_ENV: &str = "CODEC_STORE_CONFIG";

pub fn load() -> anyhow::Result<StoreConfig> {
    match std::env::var(CONFIG_ENV) {
        Ok(path) => {
            log::info!("loading store config from {}", path);
            StoreConfig::from_file(&path)
        }
        Err(_) => Ok(StoreConfig::default()),
    }
}
