use std::path::PathBuf;

/// Usage: `postdesk [config-file]`
fn main() -> anyhow::Result<()> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    postdesk::run(config_path.as_deref())
}
