use clap::Subcommand;

use slotwatch_core::notify::TelegramSink;
use slotwatch_core::store::{keyring_store, Credentials};

#[derive(Subcommand)]
pub enum AuthAction {
    /// Appointment portal credentials
    Portal {
        #[command(subcommand)]
        action: PortalOp,
    },
    /// Telegram bot settings
    Telegram {
        #[command(subcommand)]
        action: TelegramOp,
    },
    /// Speech-recognition provider keys
    Provider {
        #[command(subcommand)]
        action: ProviderOp,
    },
    /// Availability API key
    Api {
        #[command(subcommand)]
        action: ApiOp,
    },
}

#[derive(Subcommand)]
pub enum PortalOp {
    /// Store portal credentials in the OS keyring
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Remove stored portal credentials
    Logout,
    /// Check whether portal credentials are stored
    Status,
}

#[derive(Subcommand)]
pub enum TelegramOp {
    /// Store bot token and chat id
    Login {
        #[arg(long)]
        bot_token: String,
        #[arg(long)]
        chat_id: String,
    },
    /// Remove stored Telegram settings
    Logout,
    /// Check whether Telegram is configured
    Status,
}

#[derive(Subcommand)]
pub enum ProviderOp {
    /// Store a provider key
    Set {
        /// Provider name: google-speech, wit-ai or twocaptcha
        provider: String,
        #[arg(long)]
        key: String,
    },
    /// Remove a provider key
    Clear { provider: String },
    /// Show which providers have keys stored
    Status,
}

#[derive(Subcommand)]
pub enum ApiOp {
    /// Store the availability API key
    Set {
        #[arg(long)]
        key: String,
    },
    /// Remove the availability API key
    Clear,
    /// Check whether the availability API key is stored
    Status,
}

const PROVIDER_KEYS: &[(&str, &str)] = &[
    ("google-speech", "google_speech_key"),
    ("wit-ai", "wit_ai_token"),
    ("twocaptcha", "twocaptcha_api_key"),
];

const API_KEY: &str = "availability_api_key";

pub fn run(action: AuthAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        AuthAction::Portal { action } => handle_portal(action),
        AuthAction::Telegram { action } => handle_telegram(action),
        AuthAction::Provider { action } => handle_provider(action),
        AuthAction::Api { action } => handle_api(action),
    }
}

fn handle_portal(op: PortalOp) -> Result<(), Box<dyn std::error::Error>> {
    match op {
        PortalOp::Login { username, password } => {
            Credentials::store(&username, &password)?;
            println!("portal credentials stored");
        }
        PortalOp::Logout => {
            Credentials::clear()?;
            println!("portal credentials removed");
        }
        PortalOp::Status => {
            println!(
                "{}",
                if Credentials::is_stored() {
                    "stored"
                } else {
                    "not stored"
                }
            );
        }
    }
    Ok(())
}

fn handle_telegram(op: TelegramOp) -> Result<(), Box<dyn std::error::Error>> {
    match op {
        TelegramOp::Login { bot_token, chat_id } => {
            TelegramSink::store(&bot_token, &chat_id)?;
            println!("telegram configured");
        }
        TelegramOp::Logout => {
            keyring_store::delete("telegram_bot_token")?;
            keyring_store::delete("telegram_chat_id")?;
            println!("telegram settings removed");
        }
        TelegramOp::Status => {
            let configured = matches!(keyring_store::get("telegram_bot_token"), Ok(Some(_)))
                && matches!(keyring_store::get("telegram_chat_id"), Ok(Some(_)));
            println!("{}", if configured { "configured" } else { "not configured" });
        }
    }
    Ok(())
}

fn provider_key(provider: &str) -> Result<&'static str, Box<dyn std::error::Error>> {
    PROVIDER_KEYS
        .iter()
        .find(|(name, _)| *name == provider)
        .map(|(_, key)| *key)
        .ok_or_else(|| format!("unknown provider: {provider} (expected google-speech, wit-ai or twocaptcha)").into())
}

fn handle_provider(op: ProviderOp) -> Result<(), Box<dyn std::error::Error>> {
    match op {
        ProviderOp::Set { provider, key } => {
            keyring_store::set(provider_key(&provider)?, &key)?;
            println!("{provider} key stored");
        }
        ProviderOp::Clear { provider } => {
            keyring_store::delete(provider_key(&provider)?)?;
            println!("{provider} key removed");
        }
        ProviderOp::Status => {
            for (name, key) in PROVIDER_KEYS {
                let stored = matches!(keyring_store::get(key), Ok(Some(_)));
                println!("{name}: {}", if stored { "stored" } else { "not stored" });
            }
        }
    }
    Ok(())
}

fn handle_api(op: ApiOp) -> Result<(), Box<dyn std::error::Error>> {
    match op {
        ApiOp::Set { key } => {
            keyring_store::set(API_KEY, &key)?;
            println!("availability API key stored");
        }
        ApiOp::Clear => {
            keyring_store::delete(API_KEY)?;
            println!("availability API key removed");
        }
        ApiOp::Status => {
            let stored = matches!(keyring_store::get(API_KEY), Ok(Some(_)));
            println!("{}", if stored { "stored" } else { "not stored" });
        }
    }
    Ok(())
}
