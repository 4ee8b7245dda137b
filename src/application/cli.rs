use std::io;
use std::path;

use anyhow::bail;
use anyhow::Result;
use clap::builder::PossibleValuesParser;
use clap::value_parser;
use clap::Arg;
use clap::ArgAction;
use clap::Command;
use clap_complete::generate;
use clap_complete::Generator;
use clap_complete::Shell;
use strum::VariantNames;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::configuration::LogFormat;
use crate::domain::models::ConnectorName;

fn print_completions<G: Generator>(gen: G, cmd: &mut Command) {
    generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
}

async fn create_config_file() -> Result<()> {
    let config_file_path_str = Config::default(ConfigKey::ConfigFile);
    let config_file_path = path::PathBuf::from(&config_file_path_str);
    if config_file_path.exists() {
        bail!(format!(
            "Config file already exists at {config_file_path_str}"
        ));
    }

    if let Some(parent) = config_file_path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let mut file = fs::File::create(&config_file_path).await?;
    file.write_all(Config::serialize_default(build()).as_bytes())
        .await?;

    println!("Created default config file at {config_file_path_str}");
    return Ok(());
}

fn subcommand_completions() -> Command {
    return Command::new("completions")
        .about("Generates shell completions.")
        .arg(
            clap::Arg::new("shell")
                .short('s')
                .long("shell")
                .help("Which shell to generate completions for.")
                .action(ArgAction::Set)
                .value_parser(value_parser!(Shell))
                .required(true),
        );
}

fn subcommand_config() -> Command {
    return Command::new("config")
        .about("Configuration file options.")
        .subcommand(
            Command::new("create").about("Saves the default config file to the configuration file path. This command will fail if the file exists already.")
        )
        .subcommand(
            Command::new("default").about("Outputs the default configuration file to stdout.")
        )
        .subcommand(
            Command::new("path").about("Returns the default path for the configuration file.")
        );
}

fn subcommand_serve() -> Command {
    return Command::new("serve")
        .about("Start the relay. This is the default when no subcommand is given.");
}

fn config_arg(key: ConfigKey, env: &'static str, help: &str) -> Arg {
    let default = Config::default(key);
    let help = if default.is_empty() {
        help.to_string()
    } else {
        format!("{help} [default: {default}]")
    };

    return Arg::new(key.to_string())
        .long(key.to_string())
        .env(env)
        .num_args(1)
        .help(help)
        .global(true);
}

pub fn build() -> Command {
    let about = format!(
        "{}\n\nVersion: {}\nCommit: {}",
        env!("CARGO_PKG_DESCRIPTION"),
        env!("CARGO_PKG_VERSION"),
        env!("VERGEN_GIT_DESCRIBE")
    );

    return Command::new("whatsapp-relay")
        .about(about)
        .author(env!("CARGO_PKG_AUTHORS"))
        .version(env!("CARGO_PKG_VERSION"))
        .arg_required_else_help(false)
        .subcommand(subcommand_serve())
        .subcommand(subcommand_completions())
        .subcommand(subcommand_config())
        .arg(
            config_arg(
                ConfigKey::BackendURL,
                "FASTAPI_URL",
                "Base URL of the backend inbound messages are forwarded to.",
            )
            .short('b'),
        )
        .arg(config_arg(
            ConfigKey::BackendTimeout,
            "WHATSAPP_RELAY_BACKEND_TIMEOUT",
            "Time to wait in milliseconds for the backend to process a message.",
        ))
        .arg(
            config_arg(
                ConfigKey::ConfigFile,
                "WHATSAPP_RELAY_CONFIG_FILE",
                "Path to configuration file",
            )
            .short('c'),
        )
        .arg(
            config_arg(
                ConfigKey::Connector,
                "WHATSAPP_RELAY_CONNECTOR",
                "The gateway running the WhatsApp Web session.",
            )
            .value_parser(PossibleValuesParser::new(ConnectorName::VARIANTS)),
        )
        .arg(config_arg(
            ConfigKey::FallbackMessage,
            "WHATSAPP_RELAY_FALLBACK_MESSAGE",
            "Sent to the sender when the backend fails to process their message.",
        ))
        .arg(config_arg(
            ConfigKey::GatewayTimeout,
            "WHATSAPP_RELAY_GATEWAY_TIMEOUT",
            "Time to wait in milliseconds for the gateway to answer a request.",
        ))
        .arg(config_arg(
            ConfigKey::GatewayToken,
            "WHATSAPP_RELAY_GATEWAY_TOKEN",
            "API key for the gateway.",
        ))
        .arg(config_arg(
            ConfigKey::GatewayURL,
            "WHATSAPP_RELAY_GATEWAY_URL",
            "Gateway API URL when using the Evolution connector.",
        ))
        .arg(config_arg(
            ConfigKey::Host,
            "WHATSAPP_RELAY_HOST",
            "Address the HTTP API binds to.",
        ))
        .arg(config_arg(
            ConfigKey::InitRetryDelay,
            "WHATSAPP_RELAY_INIT_RETRY_DELAY",
            "Time to wait in milliseconds before retrying a session that failed to start.",
        ))
        .arg(config_arg(
            ConfigKey::Instance,
            "WHATSAPP_RELAY_INSTANCE",
            "Name of the session on the gateway.",
        ))
        .arg(
            config_arg(
                ConfigKey::LogFormat,
                "WHATSAPP_RELAY_LOG_FORMAT",
                "Log output format.",
            )
            .value_parser(PossibleValuesParser::new(LogFormat::VARIANTS)),
        )
        .arg(
            config_arg(
                ConfigKey::Port,
                "PORT",
                "Port the HTTP API listens on.",
            )
            .short('p'),
        )
        .arg(config_arg(
            ConfigKey::ReconnectDelay,
            "WHATSAPP_RELAY_RECONNECT_DELAY",
            "Time to wait in milliseconds before reconnecting a dropped session.",
        ))
        .arg(config_arg(
            ConfigKey::WebhookURL,
            "WHATSAPP_RELAY_WEBHOOK_URL",
            "URL the gateway delivers events to. Defaults to the local /webhook route.",
        ));
}

/// Returns whether the relay should start.
pub async fn parse() -> Result<bool> {
    let matches = build().get_matches();

    match matches.subcommand() {
        Some(("serve", subcmd_matches)) => {
            Config::load(build(), vec![&matches, subcmd_matches]).await?;
        }
        Some(("completions", subcmd_matches)) => {
            if let Some(completions) = subcmd_matches.get_one::<Shell>("shell").copied() {
                let mut app = build();
                print_completions(completions, &mut app);
            }
            return Ok(false);
        }
        Some(("config", subcmd_matches)) => match subcmd_matches.subcommand() {
            Some(("create", _)) => {
                create_config_file().await?;
                return Ok(false);
            }
            Some(("default", _)) => {
                println!("{}", Config::serialize_default(build()));
                return Ok(false);
            }
            Some(("path", _)) => {
                println!("{}", Config::default(ConfigKey::ConfigFile));
                return Ok(false);
            }
            _ => {
                subcommand_config().print_long_help()?;
                return Ok(false);
            }
        },
        _ => {
            Config::load(build(), vec![&matches]).await?;
        }
    }

    return Ok(true);
}
