use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use tracing_subscriber::EnvFilter;

use parcel_quote::config::{self, ConfigError};
use parcel_quote::domain::{Address, ItemCounts, Packer, WeightOverrides};
use parcel_quote::{
    CarrierApiClient, LabelPurchaseError, QuoteService, QuoteServiceError, RateSourceError,
    APP_VERSION, GIT_TAG,
};

#[derive(Parser)]
#[command(name = "parcel-quote")]
#[command(about = "Pack an order into boxes and quote carriers that can ship every box")]
#[command(version = GIT_TAG.unwrap_or(APP_VERSION))]
struct Cli {
    /// Shipping config file (defaults to the per-user config, then built-ins)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack an order and print the packing solution
    Pack {
        #[command(flatten)]
        items: ItemArgs,
    },
    /// Pack an order and quote every configured origin
    Quote {
        #[command(flatten)]
        items: ItemArgs,
        #[command(flatten)]
        to: AddressArgs,
    },
    /// Buy one label per box; shipment and rate ids pair up in order
    Buy {
        #[arg(long = "shipment-id", required = true)]
        shipment_ids: Vec<String>,
        #[arg(long = "rate-id", required = true)]
        rate_ids: Vec<String>,
    },
    /// Void previously bought labels
    Void {
        #[arg(long = "shipment-id", required = true)]
        shipment_ids: Vec<String>,
    },
    /// Validate the configuration and print the effective values
    CheckConfig,
}

#[derive(Args)]
struct ItemArgs {
    #[arg(long, default_value_t = 0)]
    small: u32,
    #[arg(long, default_value_t = 0)]
    medium: u32,
    #[arg(long, default_value_t = 0)]
    large: u32,
    #[arg(long, default_value_t = 0)]
    xlarge: u32,

    /// Per-item weight in ounces, replacing the configured average
    #[arg(long)]
    small_weight: Option<f64>,
    #[arg(long)]
    medium_weight: Option<f64>,
    #[arg(long)]
    large_weight: Option<f64>,
    #[arg(long)]
    xlarge_weight: Option<f64>,
}

impl ItemArgs {
    fn counts(&self) -> ItemCounts {
        ItemCounts::new(self.small, self.medium, self.large, self.xlarge)
    }

    fn overrides(&self) -> WeightOverrides {
        WeightOverrides {
            small: self.small_weight,
            medium: self.medium_weight,
            large: self.large_weight,
            xlarge: self.xlarge_weight,
        }
    }
}

#[derive(Args)]
struct AddressArgs {
    #[arg(long = "to-name")]
    name: String,
    #[arg(long = "to-company")]
    company: Option<String>,
    #[arg(long = "to-street1")]
    street1: String,
    #[arg(long = "to-street2")]
    street2: Option<String>,
    #[arg(long = "to-city")]
    city: String,
    #[arg(long = "to-state")]
    state: String,
    #[arg(long = "to-zip")]
    zip: String,
    #[arg(long = "to-country", default_value = "US")]
    country: String,
    #[arg(long = "to-phone")]
    phone: Option<String>,
    #[arg(long = "to-email")]
    email: Option<String>,
}

impl From<AddressArgs> for Address {
    fn from(args: AddressArgs) -> Self {
        Address {
            name: args.name,
            company: args.company,
            street1: args.street1,
            street2: args.street2,
            city: args.city,
            state: args.state,
            zip: args.zip,
            country: args.country,
            phone: args.phone,
            email: args.email,
        }
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Service(#[from] QuoteServiceError),
    #[error(transparent)]
    RateSource(#[from] RateSourceError),
    #[error(transparent)]
    Labels(#[from] LabelPurchaseError),
    #[error("failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
    #[error("{0}")]
    Failed(String),
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "command failed");
            if let CliError::Labels(labels) = &err {
                // Labels bought before the failure go to stdout for voiding.
                if let Ok(json) = serde_json::to_string_pretty(labels.purchased()) {
                    println!("{json}");
                }
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = config::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::CheckConfig => print_json(&config),
        Commands::Pack { items } => {
            let packer = Packer::new(config.boxes.clone(), config.sizing.clone());
            let solution = packer.pack_with_overrides(&items.counts(), Some(&items.overrides()));
            print_json(&solution)?;
            match solution.error_message() {
                Some(message) => Err(CliError::Failed(message)),
                None => Ok(()),
            }
        }
        Commands::Quote { items, to } => {
            let service = connect(config)?;
            let response = service
                .get_shipping_quote_with_overrides(
                    &items.counts(),
                    &to.into(),
                    Some(&items.overrides()),
                )
                .await;
            print_json(&response)?;
            match response.error {
                Some(message) => Err(CliError::Failed(message)),
                None => Ok(()),
            }
        }
        Commands::Buy {
            shipment_ids,
            rate_ids,
        } => {
            let service = connect(config)?;
            let labels = service
                .create_labels_for_multi_box(&shipment_ids, &rate_ids)
                .await?;
            print_json(&labels)
        }
        Commands::Void { shipment_ids } => {
            let service = connect(config)?;
            let mut failed = 0usize;
            for (shipment_id, outcome) in shipment_ids
                .iter()
                .zip(service.void_labels(&shipment_ids).await)
            {
                match outcome {
                    Ok(outcome) => print_json(&outcome)?,
                    Err(err) => {
                        failed += 1;
                        error!(shipment_id = %shipment_id, error = %err, "void failed");
                    }
                }
            }
            if failed > 0 {
                return Err(CliError::Failed(format!(
                    "{failed} of {} voids failed",
                    shipment_ids.len()
                )));
            }
            Ok(())
        }
    }
}

fn connect(config: config::ShippingConfig) -> Result<QuoteService, CliError> {
    let client = CarrierApiClient::from_config(&config.api)?;
    Ok(QuoteService::new(config, Arc::new(client))?)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
