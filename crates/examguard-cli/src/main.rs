use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine as _};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "examguard", about = "ExamGuard identity verification and proctoring CLI")]
struct Cli {
    /// Talk to a daemon on the system bus instead of the session bus
    #[arg(long, global = true)]
    system: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a subject from one or more photos (replaces any existing template)
    Enroll {
        subject: String,
        /// Image files; a single photo is expanded with synthetic variations
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Verify a photo against a subject's template
    Verify { subject: String, file: PathBuf },
    /// Run the proctoring checks on one frame
    Assess { subject: String, file: PathBuf },
    /// Remove a subject's template
    Clear { subject: String },
    /// Show what is stored for a subject
    Info { subject: String },
    /// Show daemon status
    Status,
}

#[zbus::proxy(
    interface = "org.examguard.Proctor1",
    default_service = "org.examguard.Proctor1",
    default_path = "/org/examguard/Proctor1"
)]
trait Proctor {
    async fn enroll(&self, subject: &str, images: Vec<String>) -> zbus::Result<(bool, String)>;
    async fn verify(&self, subject: &str, image: &str) -> zbus::Result<(bool, f64)>;
    async fn assess(&self, subject: &str, image: &str) -> zbus::Result<String>;
    async fn clear_template(&self, subject: &str) -> zbus::Result<bool>;
    async fn template_info(&self, subject: &str) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

/// Read an image file and base64-encode it for the wire.
fn encode_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(general_purpose::STANDARD.encode(bytes))
}

fn print_json(text: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(text).context("daemon returned invalid JSON")?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = if cli.system {
        zbus::Connection::system().await
    } else {
        zbus::Connection::session().await
    }
    .context("cannot connect to D-Bus")?;
    let proxy = ProctorProxy::new(&conn)
        .await
        .context("examguardd is not reachable")?;

    match cli.command {
        Commands::Enroll { subject, files } => {
            let images = files
                .iter()
                .map(|f| encode_file(f))
                .collect::<Result<Vec<_>>>()?;
            tracing::debug!(subject, images = images.len(), "sending enrollment");
            let (ok, message) = proxy.enroll(&subject, images).await?;
            println!("{message}");
            if !ok {
                std::process::exit(1);
            }
        }
        Commands::Verify { subject, file } => {
            let (matched, confidence) = proxy.verify(&subject, &encode_file(&file)?).await?;
            println!(
                "{}: confidence {:.3}",
                if matched { "match" } else { "no match" },
                confidence
            );
            if !matched {
                std::process::exit(1);
            }
        }
        Commands::Assess { subject, file } => {
            print_json(&proxy.assess(&subject, &encode_file(&file)?).await?)?;
        }
        Commands::Clear { subject } => {
            if proxy.clear_template(&subject).await? {
                println!("Template for {subject} removed");
            } else {
                println!("No template stored for {subject}");
            }
        }
        Commands::Info { subject } => {
            print_json(&proxy.template_info(&subject).await?)?;
        }
        Commands::Status => {
            print_json(&proxy.status().await?)?;
        }
    }

    Ok(())
}
