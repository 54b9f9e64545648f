//! `slice init` — scaffold a slice.toml.

use slice_core::SliceConfig;

pub fn run(name: &str) -> anyhow::Result<()> {
    let path = std::path::Path::new("slice.toml");
    if path.exists() {
        anyhow::bail!("slice.toml already exists");
    }
    let config = SliceConfig::scaffold(name);
    std::fs::write(path, config.to_toml_string()?)?;
    println!("✓ Generated slice.toml for project {name}");
    Ok(())
}
