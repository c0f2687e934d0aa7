// src/main.rs
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, info, warn};

mod config;
mod deid;
mod error;
mod gcp;
mod healthcare;
mod http;
mod logging;
mod metrics;
mod reporting;
mod storage;
#[cfg(test)]
mod test_utils;

use crate::config::Config;
use crate::deid::{DeidentificationCoordinator, JobRequest};
use crate::gcp::GcpAuth;
use crate::healthcare::{GoogleHealthcareApi, HealthcareGateway};
use crate::http::{AppState, Server};
use crate::metrics::Metrics;
use crate::reporting::TracingReporter;
use crate::storage::{CloudStorageBucket, CloudStorageObject, CloudStorageService, V4Signer};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = config::DEFAULT_CONFIG_PATH,
        global = true
    )]
    config: String,

    /// Show verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP/WebSocket server and the debug metrics server
    Serve,
    /// Run one de-identification job in the foreground
    Deidentify {
        /// Store the files are uploaded into
        #[arg(long)]
        source: String,

        /// Store receiving the de-identified copy (generated when omitted)
        #[arg(long)]
        destination: Option<String>,

        /// gs:// pattern to import into the source store
        #[arg(long = "import", value_name = "GS_URI")]
        content_uri: Option<String>,

        /// gs:// prefix the de-identified store is exported to
        #[arg(long = "export", value_name = "GS_URI")]
        export: Option<String>,

        /// Local DICOM files to upload
        files: Vec<PathBuf>,
    },
    /// Manage DICOM stores in the configured dataset
    Stores {
        #[command(subcommand)]
        command: StoresCommand,
    },
    /// Print a signed URL for one object in the configured bucket
    Sign {
        object: String,

        #[arg(long, value_enum, default_value_t = SignMethod::Put)]
        method: SignMethod,
    },
}

#[derive(Subcommand, Debug)]
enum StoresCommand {
    /// List every store
    List,
    /// Create an empty store
    Create { id: String },
    /// Delete a store and its instances
    Delete { id: String },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SignMethod {
    Put,
    Post,
}

impl SignMethod {
    fn as_str(&self) -> &'static str {
        match self {
            SignMethod::Put => "PUT",
            SignMethod::Post => "POST",
        }
    }
}

/// Services shared by every command
struct Components {
    storage: CloudStorageService,
    coordinator: DeidentificationCoordinator,
    bucket: CloudStorageBucket,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match config::load_config(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from {}: {}", cli.config, e);
            process::exit(1);
        }
    };

    let _log_guard = logging::init_logging(config.logging.as_ref(), cli.verbose)?;

    info!("DICOM de-identifier v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded configuration from: {}", cli.config);

    let components = build_components(&config)?;

    let result = match cli.command {
        Commands::Serve => serve(config, components).await,
        Commands::Deidentify {
            source,
            destination,
            content_uri,
            export,
            files,
        } => {
            let destination = destination
                .unwrap_or_else(|| HealthcareGateway::generate_dicom_store_id("deidentified"));
            let mut request = JobRequest::new(source, destination).with_files(files);
            if let Some(content_uri) = content_uri {
                request = request.with_import(content_uri);
            }
            if let Some(export) = export {
                request = request.with_export(export);
            }
            deidentify(components, request).await
        }
        Commands::Stores { command } => stores(components, command).await,
        Commands::Sign { object, method } => sign(components, object, method).await,
    };

    if let Err(e) = result {
        error!("{:#}", e);
        process::exit(1);
    }
    Ok(())
}

fn build_components(config: &Config) -> Result<Components> {
    let client = reqwest::Client::builder()
        .timeout(config.gcp.request_timeout())
        .build()
        .context("Failed to build HTTP client")?;

    let auth = GcpAuth::new(&config.gcp.service_account, client.clone());
    let dataset = config.gcp.dataset();
    info!("Using dataset {}", dataset.name());

    let api = GoogleHealthcareApi::new(client, auth, &config.gcp.healthcare_endpoint, dataset);
    let gateway = HealthcareGateway::new(Arc::new(api), config.polling.policy());

    Ok(Components {
        storage: CloudStorageService::new(Arc::new(V4Signer::new()), &config.gcp.service_account),
        coordinator: DeidentificationCoordinator::new(gateway)
            .with_max_finished(config.jobs.max_finished),
        bucket: CloudStorageBucket {
            name: config.storage.bucket.clone(),
        },
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn serve(config: Config, components: Components) -> Result<()> {
    let metrics = Metrics::new();
    let state = AppState {
        storage: components.storage,
        coordinator: components.coordinator.clone(),
        metrics: metrics.clone(),
        reporter: Arc::new(TracingReporter),
        bucket: components.bucket,
    };

    if let Some(port) = config.http.debug_port {
        let debug = Server::bind(
            &format!("0.0.0.0:{}", port),
            http::debug_router(metrics),
            None,
            config.http.shutdown_timeout(),
        )
        .await?;
        tokio::spawn(async move {
            if let Err(e) = debug.serve(shutdown_signal()).await {
                error!("Debug server failed: {:#}", e);
            }
        });
    }

    let router = http::build_router(state, &config.http.allowed_origins);
    let server = Server::bind(
        &config.http.addr,
        router,
        config.http.domain.clone(),
        config.http.shutdown_timeout(),
    )
    .await?;

    server.serve(shutdown_signal()).await?;

    components.coordinator.cancel_all().await;
    info!("Server stopped");
    Ok(())
}

async fn deidentify(components: Components, request: JobRequest) -> Result<()> {
    let coordinator = components.coordinator;
    let mut handle = coordinator.submit(request).await?;

    let outcome = tokio::select! {
        joined = &mut handle.task => joined,
        _ = shutdown_signal() => {
            info!("Interrupted, cancelling job {}", handle.id);
            coordinator.cancel(handle.id).await?;
            (&mut handle.task).await
        }
    };

    let report = outcome.context("job task failed")??;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn stores(components: Components, command: StoresCommand) -> Result<()> {
    let gateway = components.coordinator.gateway();
    match command {
        StoresCommand::List => {
            for store in gateway.get_dicom_store_list().await? {
                println!("{}", store.store_id);
            }
        }
        StoresCommand::Create { id } => {
            let store = gateway.create_dicom_store(&id).await?;
            println!("{}", store.store_id);
        }
        StoresCommand::Delete { id } => {
            gateway.delete_dicom_store(&id).await?;
        }
    }
    Ok(())
}

async fn sign(components: Components, object: String, method: SignMethod) -> Result<()> {
    let object = CloudStorageObject { name: object };
    let signed = components
        .storage
        .generate_presigned_bucket_url(&components.bucket, &object, method.as_str())
        .await?;
    println!("{}", signed.url);
    Ok(())
}
