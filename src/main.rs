use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use http::HeaderValue;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use preauth_transport::config::{self, EnvironmentType, TransportConfig};
use preauth_transport::observability::logging;
use preauth_transport::{
    DeliveryQueue, DispatchOutcome, Dispatcher, LoopDetector, ReqwestTransport, SessionExtractor,
    SessionKey, TransportRequest,
};

#[derive(Parser)]
#[command(name = "preauth")]
#[command(about = "Send unauthenticated requests through the pinned pre-auth transport", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base64 key used to seal extracted session cookies
    #[arg(short = 'k', long)]
    session_key: Option<String>,

    /// Backend environment (production, staging)
    #[arg(short, long)]
    environment: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// GET a path relative to the backend URL
    Get { path: String },
    /// POST a JSON body to a path relative to the backend URL
    Post {
        path: String,
        #[arg(long)]
        json: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => TransportConfig::default(),
    };
    if let Some(name) = &cli.environment {
        config.environment = EnvironmentType::from_name(name);
    }

    logging::init_logging(&config.observability)?;

    let endpoints = config.endpoints();
    tracing::info!(
        environment = %config.environment,
        pins = config.trust.len(),
        "preauth v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let transport = ReqwestTransport::new(config.pinned_keys()?, &config.timeouts)?;
    let detector = LoopDetector::with_config(&config.loop_detection, |_| {});

    let mut dispatcher = Dispatcher::new(endpoints.backend_url, Arc::new(transport), Handle::current())
        .with_loop_detector(Arc::new(detector))
        .with_user_agent(HeaderValue::from_static(concat!(
            "preauth/",
            env!("CARGO_PKG_VERSION")
        )));

    tracing::info!(backend = %dispatcher.base_url(), "Dispatcher ready");

    let queue = DeliveryQueue::new("main");

    if let Some(encoded) = cli.session_key.as_ref().or(config.session.key.as_ref()) {
        let key = SessionKey::from_base64(encoded)?;
        dispatcher = dispatcher.with_session_extractor(SessionExtractor::new(key));
        dispatcher.set_session_listener(&queue, |info| {
            println!("session: {}", info.identifier);
        });
    }

    let request = match cli.command {
        Commands::Get { path } => TransportRequest::get(path),
        Commands::Post { path, json } => {
            let body: Value = serde_json::from_str(&json)?;
            TransportRequest::post(path, body)
        }
    };

    let (tx, rx) = oneshot::channel();
    let request = request.on_complete(&queue, move |result| {
        let _ = tx.send(result);
    });

    let outcome = dispatcher.enqueue(move || Some(request));
    if outcome != DispatchOutcome::AdmittedAndSent {
        return Err(format!("request not dispatched: {}", outcome).into());
    }

    let response = rx.await??;
    println!("status: {}", response.status);
    match response.json::<Value>() {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", String::from_utf8_lossy(&response.body)),
    }

    Ok(())
}
