use clap::Subcommand;
use slotwatch_core::Config;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value by dotted key (e.g. "monitor.cooldown_secs")
    Get { key: String },
    /// Set a config value by dotted key
    Set { key: String, value: String },
    /// List the whole configuration
    List,
    /// Validate the configuration on disk
    Validate,
    /// Reset config to defaults
    Reset,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let table = toml::Value::try_from(&config)?;
            match lookup(&table, &key) {
                Some(value) => println!("{value}"),
                None => {
                    eprintln!("unknown key: {key}");
                    std::process::exit(1);
                }
            }
        }
        ConfigAction::Set { key, value } => {
            let config = Config::load()?;
            let mut table = toml::Value::try_from(&config)?;
            set_value(&mut table, &key, &value)?;
            let updated: Config = table.try_into()?;
            updated.validate()?;
            updated.save()?;
            println!("ok");
        }
        ConfigAction::List => {
            let config = Config::load()?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Validate => {
            let config = Config::load()?;
            config.validate()?;
            println!("valid");
        }
        ConfigAction::Reset => {
            let config = Config::default();
            config.save()?;
            println!("config reset to defaults");
        }
    }
    Ok(())
}

fn lookup<'a>(table: &'a toml::Value, key: &str) -> Option<&'a toml::Value> {
    key.split('.').try_fold(table, |node, part| node.get(part))
}

/// Set a dotted key, parsing the value as TOML first (so numbers and
/// booleans keep their type) and falling back to a plain string.
fn set_value(table: &mut toml::Value, key: &str, value: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut node = table;
    let parts: Vec<&str> = key.split('.').collect();
    let (last, path) = parts.split_last().ok_or("empty key")?;

    for part in path {
        node = node
            .get_mut(*part)
            .ok_or_else(|| format!("unknown key: {key}"))?;
    }
    let slot = node
        .get_mut(*last)
        .ok_or_else(|| format!("unknown key: {key}"))?;

    *slot = parse_scalar(value);
    Ok(())
}

fn parse_scalar(value: &str) -> toml::Value {
    format!("v = {value}")
        .parse::<toml::Table>()
        .ok()
        .and_then(|mut t| t.remove("v"))
        .unwrap_or_else(|| toml::Value::String(value.to_string()))
}
