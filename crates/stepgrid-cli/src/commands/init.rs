use std::path::Path;

use stepgrid_core::StepGridConfig;

pub fn init(path: &str, endpoint: &str, log_uri: &str, key_name: &str, force: bool) -> anyhow::Result<()> {
    let output = Path::new(path).join("stepgrid.toml");
    if output.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", output.display());
    }

    let config = StepGridConfig::scaffold(endpoint, log_uri, key_name);
    std::fs::write(&output, config.to_toml_string()?)?;
    println!("✓ Generated {}", output.display());
    Ok(())
}
