use fanout_dns_domain::Config;
use std::path::Path;

pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let mut config = Config::load(path)?;
    config.validate()?;
    Ok(config)
}
