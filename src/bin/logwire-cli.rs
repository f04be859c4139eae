use std::io::{self, BufRead, Write};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use logwire::config::ConfigSource;
use logwire::net::{ConfigSender, SendError, SendOptions};

#[derive(Parser)]
#[command(name = "logwire-cli")]
#[command(about = "Management CLI for logwire config listeners", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a logging configuration to a running listener
    UpdateConfig {
        /// Config file or inline YAML/JSON. Falls back to LOG_CONFIG.
        #[arg(short, long)]
        config: Option<String>,

        /// Replace the whole configuration instead of updating it in place.
        #[arg(short = 'o', long)]
        overwrite: bool,

        /// Listener port. Defaults to the document's `listen` key, then 9030.
        #[arg(short, long)]
        port: Option<u16>,

        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Don't ask before sending a destructive configuration.
        #[arg(short = 'y', long)]
        yes: bool,

        #[arg(long, default_value_t = 5)]
        connect_timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "logwire=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::UpdateConfig {
            config,
            overwrite,
            port,
            host,
            yes,
            connect_timeout_secs,
        } => {
            let sender = ConfigSender::new(host)
                .with_connect_timeout(Duration::from_secs(connect_timeout_secs));
            let options = SendOptions {
                port,
                incremental: !overwrite,
                require_confirmation: true,
                confirmed: yes,
            };
            update_config(&sender, ConfigSource::from(config), options).await
        }
    };

    if let Err(e) = result {
        eprintln!("error ({}): {}", e.kind(), e);
        std::process::exit(1);
    }
}

async fn update_config(
    sender: &ConfigSender,
    source: ConfigSource,
    mut options: SendOptions,
) -> Result<(), SendError> {
    let prepared = sender.prepare(source, &options)?;

    if prepared.is_destructive() && !options.confirmed {
        options.confirmed = confirm(
            "This config disables all loggers it does not name and replaces the current setup. Send it?",
        );
    }
    if prepared.is_destructive() && !options.confirmed {
        return Err(SendError::DestructiveConfigRejected);
    }

    let delivery = sender.send_prepared(&prepared).await?;
    println!("sent {} bytes to {}", delivery.bytes, delivery.peer);
    Ok(())
}

/// Ask a yes/no question on the terminal. Anything but yes means no.
fn confirm(question: &str) -> bool {
    print!("{} [y/N] ", question);
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    match io::stdin().lock().read_line(&mut answer) {
        Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}
