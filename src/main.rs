//! fsx-lifecycle CLI
//!
//! One invocation runs one reaper pass or one provisioner request against the
//! account and region from the default AWS configuration chain.

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

use fsx_lifecycle::{
    config::{Args, Command},
    logging::{self, LogFormat},
    provisioner::{Operation, Provisioner, ProvisionerRequest},
    reaper::Reaper,
    services::aws::AwsCloud,
    Clock, Services, SystemClock,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let format: LogFormat = args.log_format.parse()?;
    logging::init(&args.log_level, format);

    let services = AwsCloud::load().await.into_services();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let output = match args.command.clone() {
        Command::Reap => {
            let settings = args.reaper_settings().map_err(|e| {
                error!("Configuration error: {}", e);
                e
            })?;
            info!(
                sampling_period_secs = settings.sampling_period_secs,
                metric_interval_mins = settings.metric_interval_mins,
                claimed_threshold_mins = settings.claimed_threshold_mins,
                dry_run = settings.dry_run,
                "Starting reaper"
            );
            let report = Reaper::new(services, clock, settings).run_pass().await?;
            serde_json::to_string_pretty(&report)?
        }
        Command::Create { team, bucket } => {
            let request = ProvisionerRequest {
                operation: Some(Operation::Create),
                team: Some(team),
                bucket: Some(bucket),
                file_system_id: None,
            };
            run_provisioner(&args, services, clock, request).await?
        }
        Command::Status { file_system_id } => {
            let request = ProvisionerRequest {
                operation: Some(Operation::Status),
                file_system_id: Some(file_system_id),
                ..Default::default()
            };
            run_provisioner(&args, services, clock, request).await?
        }
        Command::Delete { file_system_id } => {
            let request = ProvisionerRequest {
                operation: Some(Operation::Delete),
                file_system_id: Some(file_system_id),
                ..Default::default()
            };
            run_provisioner(&args, services, clock, request).await?
        }
        Command::Handle { request } => {
            let request = ProvisionerRequest::from_json(&request).map_err(|e| {
                error!(error = %e, "Rejected provisioner request");
                e
            })?;
            run_provisioner(&args, services, clock, request).await?
        }
    };

    println!("{}", output);
    Ok(())
}

async fn run_provisioner(
    args: &Args,
    services: Services,
    clock: Arc<dyn Clock>,
    request: ProvisionerRequest,
) -> anyhow::Result<String> {
    let provisioner = Provisioner::new(
        services.file_systems,
        services.triggers,
        clock,
        args.provisioner_settings(),
    );
    let response = provisioner.handle(request).await?;
    Ok(serde_json::to_string(&response)?)
}
