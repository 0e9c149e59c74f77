use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result, miette};
use psd2flow::application::controller::{ConsentFlowController, StepReport};
use psd2flow::application::correlator::CallbackCorrelator;
use psd2flow::application::defaults::DefaultCredentials;
use psd2flow::config::{CERTIFICATE_FOLDER, DEFAULT_CACHE_DIR, EngineConfig};
use psd2flow::domain::environment::Environment;
use psd2flow::domain::ports::{
    AuthorizationCodeStoreBox, ConfigurationStore, ConfigurationStoreBox,
};
use psd2flow::domain::session::{Bank, FlowSession};
use psd2flow::domain::step::ApiStep;
use psd2flow::infrastructure::agent::ConsoleAgent;
use psd2flow::infrastructure::certificate::{CertificateLocations, CertificateProvider};
use psd2flow::infrastructure::json_file::JsonFileStore;
use psd2flow::infrastructure::mtls::{MtlsExecutor, ServerTrust, TransportSettings};
#[cfg(feature = "storage-rocksdb")]
use psd2flow::infrastructure::rocksdb::RocksDBStore;
use psd2flow::interfaces::callback::CallbackRoutes;
use psd2flow::interfaces::curl::{parse_curl, to_curl};
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// User the templates belong to
    #[arg(long, global = true, env = "PSD2FLOW_USER", default_value = "default")]
    user: String,

    /// Profile of the user
    #[arg(long, global = true, env = "PSD2FLOW_PROFILE", default_value = "default")]
    profile: String,

    #[arg(long, global = true, env = "PSD2FLOW_BANK_ID", default_value = "raiffeisen")]
    bank_id: String,

    /// Bank display name; selects the client certificate
    #[arg(long, global = true, env = "PSD2FLOW_BANK", default_value = "Raiffeisen Bank")]
    bank: String,

    /// Environment label, e.g. "SB Test" or "RD Prelive"
    #[arg(long, global = true, env = "PSD2FLOW_ENVIRONMENT", default_value = "SB Test")]
    environment: Environment,

    /// Directory of the JSON template cache
    #[arg(long, global = true, env = "PSD2FLOW_CACHE_DIR", default_value = DEFAULT_CACHE_DIR)]
    cache_dir: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true, env = "PSD2FLOW_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Directory with certificates shipped next to the tool
    #[arg(long, global = true, env = "PSD2FLOW_CERTIFICATE_DIR", default_value = "resources")]
    certificate_dir: PathBuf,

    /// User certificate directory [default: <cache-dir>/PSD2_Certificates]
    #[arg(long, global = true, env = "PSD2FLOW_USER_CERTIFICATE_DIR")]
    user_certificate_dir: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        env = "PSD2FLOW_CERTIFICATE_PASSWORD",
        default_value = "",
        hide_env_values = true
    )]
    certificate_password: String,

    #[arg(long, global = true, env = "PSD2FLOW_TIMEOUT_SECS", default_value_t = 60)]
    timeout_secs: u64,

    /// Verify the bank's server certificate (off by default for sandboxes)
    #[arg(long, global = true, env = "PSD2FLOW_VERIFY_SERVER")]
    verify_server: bool,

    #[arg(long, global = true, env = "PSD2FLOW_CALLBACK_SCHEME", default_value = "psd2banking")]
    callback_scheme: String,

    /// HTTPS host of the universal-link callback; without it only the custom
    /// scheme is accepted
    #[arg(long, global = true, env = "PSD2FLOW_CALLBACK_HOST")]
    callback_host: Option<String>,

    #[arg(long, global = true, env = "PSD2FLOW_CALLBACK_PATH", default_value = "/callback")]
    callback_path: String,

    #[arg(long, global = true, env = "PSD2FLOW_CLIENT_ID", default_value = "")]
    client_id: String,

    #[arg(
        long,
        global = true,
        env = "PSD2FLOW_CLIENT_SECRET",
        default_value = "",
        hide_env_values = true
    )]
    client_secret: String,

    #[arg(long, global = true, env = "PSD2FLOW_PSU_ID", default_value = "")]
    psu_id: String,

    /// Account the default consent request asks access to
    #[arg(long, global = true, env = "PSD2FLOW_IBAN", default_value = "")]
    iban: String,
}

#[derive(Subcommand)]
enum Command {
    /// Run the whole consent flow, reading the callback URL from stdin
    Run,
    /// Print the step's request as a curl command
    Curl {
        #[arg(long)]
        step: ApiStep,
    },
    /// Replace the step's request with a parsed curl command
    ApplyCurl {
        #[arg(long)]
        step: ApiStep,
        /// File with the curl command, or "-" for stdin
        input: PathBuf,
    },
    /// Print the step's template, cached response included, as JSON
    Show {
        #[arg(long)]
        step: ApiStep,
    },
    /// Deliver a redirect URL carrying an authorization code
    Callback { url: String },
    /// Remove every stored template of the user profile
    Clear,
}

impl Cli {
    fn config(&self) -> EngineConfig {
        let defaults = EngineConfig::default();
        EngineConfig {
            certificates: CertificateLocations {
                resource_root: self.certificate_dir.clone(),
                bundled_root: self.certificate_dir.join(CERTIFICATE_FOLDER),
                user_root: self
                    .user_certificate_dir
                    .clone()
                    .unwrap_or_else(|| self.cache_dir.join(CERTIFICATE_FOLDER)),
            },
            certificate_password: self.certificate_password.clone(),
            transport: TransportSettings {
                timeout: Duration::from_secs(self.timeout_secs),
                server_trust: if self.verify_server {
                    ServerTrust::Verify
                } else {
                    ServerTrust::AcceptAny
                },
            },
            callback: CallbackRoutes {
                custom_scheme: self.callback_scheme.clone(),
                universal_host: self.callback_host.clone(),
                universal_path: self.callback_path.clone(),
            },
            credentials: DefaultCredentials {
                client_id: self.client_id.clone(),
                client_secret: self.client_secret.clone(),
                psu_id: self.psu_id.clone(),
                iban: self.iban.clone(),
                ..defaults.credentials
            },
            cache_dir: self.cache_dir.clone(),
        }
    }

    fn session(&self) -> FlowSession {
        FlowSession {
            user_id: self.user.clone(),
            profile_id: self.profile.clone(),
            bank: Bank {
                id: self.bank_id.clone(),
                name: self.bank.clone(),
            },
            environment: self.environment,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "psd2flow=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.config();
    let (template_store, code_store) = open_stores(cli.db_path.as_ref(), &config)?;

    let correlator = Arc::new(CallbackCorrelator::new(code_store, config.callback.clone()));

    if let Command::Clear = cli.command {
        template_store.clear(&cli.user, &cli.profile).await?;
        println!("Cleared templates of {}/{}", cli.user, cli.profile);
        return Ok(());
    }
    if let Command::Callback { url } = &cli.command {
        return match correlator.handle_redirect(url).await? {
            Some(_) => {
                println!("Authorization code stored");
                Ok(())
            }
            None => Err(miette!("the URL carried no usable authorization code")),
        };
    }

    let executor = MtlsExecutor::new(
        CertificateProvider::new(config.certificates.clone(), config.certificate_password.clone()),
        config.transport,
    );
    let mut flow = ConsentFlowController::new(
        cli.session(),
        template_store,
        Box::new(executor),
        correlator.clone(),
        config.credentials.clone(),
    );

    match cli.command {
        Command::Run => run_flow(&mut flow, &correlator).await?,
        Command::Curl { step } => {
            println!("{}", to_curl(&flow.template(step).await?));
        }
        Command::ApplyCurl { step, input } => {
            let text = read_input(&input)?;
            let mut template = flow.template(step).await?;
            parse_curl(&text)?.apply_to(&mut template);
            flow.save_template(template).await?;
            println!("Saved template for {step}");
        }
        Command::Show { step } => {
            let template = flow.template(step).await?;
            println!("{}", serde_json::to_string_pretty(&template).into_diagnostic()?);
        }
        Command::Callback { .. } | Command::Clear => {}
    }

    Ok(())
}

fn open_stores(
    db_path: Option<&PathBuf>,
    config: &EngineConfig,
) -> Result<(ConfigurationStoreBox, AuthorizationCodeStoreBox)> {
    if let Some(db_path) = db_path {
        #[cfg(feature = "storage-rocksdb")]
        {
            let store = RocksDBStore::open(db_path).into_diagnostic()?;
            return Ok((Box::new(store.clone()), Box::new(store)));
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        warn!(
            path = %db_path.display(),
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to the JSON file cache."
        );
    }
    let store = JsonFileStore::open(&config.cache_dir).into_diagnostic()?;
    Ok((Box::new(store.clone()), Box::new(store)))
}

fn read_input(input: &PathBuf) -> Result<String> {
    if input.as_os_str() == "-" {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text).into_diagnostic()?;
        Ok(text)
    } else {
        std::fs::read_to_string(input).into_diagnostic()
    }
}

async fn run_flow(flow: &mut ConsentFlowController, correlator: &CallbackCorrelator) -> Result<()> {
    for step in [
        ApiStep::ConsentCreation,
        ApiStep::CheckConsentDetails,
        ApiStep::ScaLinkGeneration,
    ] {
        print_report(&flow.run_step(step).await?);
    }

    let agent = ConsoleAgent::new(io::stdout());
    flow.launch_authorization(&agent).await?;
    println!("Accepted callbacks: {}", correlator.routes().describe());
    println!(
        "Paste the callback URL (or press Enter if it was delivered with `psd2flow callback`):"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let Some(line) = lines.next_line().await.into_diagnostic()? else {
            flow.cancel_authorization();
            return Err(miette!("stdin closed before an authorization code arrived"));
        };
        let line = line.trim();
        if line.is_empty() {
            // Delivered out of process; re-announce the durable code.
            if let Some(code) = correlator.consume().await? {
                correlator.publish(&code).await?;
                break;
            }
            warn!("no authorization code has been delivered yet");
            continue;
        }
        if correlator.handle_redirect(line).await?.is_some() {
            break;
        }
    }
    flow.await_authorization().await?;
    info!("authorization completed");

    print_report(&flow.run_step(ApiStep::ValidateConsent).await?);
    if !flow.consent_gate_open() {
        return Err(miette!(
            "{}",
            flow.last_error().unwrap_or("consent is not valid")
        ));
    }
    print_report(&flow.run_step(ApiStep::GenerateAccessToken).await?);
    Ok(())
}

fn print_report(report: &StepReport) {
    println!("== {} ({}) ==", report.step, report.status_code);
    println!("{}", report.raw_text);
    if let Some(message) = &report.message {
        eprintln!("note: {message}");
    }
}
