//! vm-customize-rs - vSphere VM guest customization
//!
//! Dry-run planner and payload codec for the customization engine.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use vm_customize_rs::config::load_config;
use vm_customize_rs::customization::Transport;
use vm_customize_rs::userdata::{encode_gzip_base64, try_decode_gzip_base64};
use vm_customize_rs::vm::{
    InMemoryVm, VirtualMachine, VirtualMachineContext, VmCall, VmUpdateArgs,
};
use vm_customize_rs::vsphere::{ConfigInfo, VirtualEthernetCard};
use vm_customize_rs::{CustomizationSpecs, Session};

#[derive(Parser)]
#[command(name = "vm-customize-rs")]
#[command(author, version, about = "Guest customization for vSphere virtual machines", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan one customization pass against a fixture without touching a real VM
    Plan {
        /// YAML fixture with the VM, its update args and live state
        #[arg(long)]
        fixture: PathBuf,
        /// Engine configuration file
        #[arg(long, env = "VM_CUSTOMIZE_CONFIG")]
        config: Option<PathBuf>,
        /// Render metadata values as templates
        #[arg(long)]
        templating: bool,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
        format: OutputFormat,
    },
    /// Encode text as gzip+base64
    Encode {
        /// Text to encode; read from stdin when omitted
        text: Option<String>,
    },
    /// Decode gzip+base64 text; plain text is printed unchanged
    Decode {
        /// Text to decode; read from stdin when omitted
        text: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

/// A VM and the live state of its backing vSphere VM
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Fixture {
    vm: VirtualMachine,
    update_args: VmUpdateArgs,
    config_info: ConfigInfo,
    eth_cards: Vec<VirtualEthernetCard>,
}

impl Fixture {
    fn in_memory_vm(&self) -> InMemoryVm {
        InMemoryVm::new()
            .with_config_info(self.config_info.clone())
            .with_eth_cards(self.eth_cards.clone())
    }
}

/// What a pass would do
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanReport {
    transport: String,
    specs: CustomizationSpecs,
    calls: Vec<VmCall>,
    config_info: ConfigInfo,
}

fn init_logging(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

async fn load_fixture(path: &Path) -> Result<Fixture> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read fixture {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse fixture {}", path.display()))
}

async fn plan(session: &Session, fixture: &Fixture) -> Result<PlanReport> {
    let vm_ctx = VirtualMachineContext::new(fixture.vm.clone());
    let transport = Transport::resolve(&fixture.vm, fixture.update_args.vm_metadata.transport);

    // Specs are computed against a scratch VM so its calls stay out of the report
    let specs = session
        .customization_specs(
            &vm_ctx,
            &fixture.in_memory_vm(),
            &fixture.config_info,
            &mut fixture.update_args.clone(),
        )
        .await?;

    let res_vm = fixture.in_memory_vm();
    session
        .customize(
            &vm_ctx,
            &res_vm,
            &fixture.config_info,
            &mut fixture.update_args.clone(),
        )
        .await
        .context("Customization pass failed")?;

    Ok(PlanReport {
        transport: transport.to_string(),
        specs,
        calls: res_vm.calls(),
        config_info: res_vm.config_info(),
    })
}

fn render(report: &PlanReport, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Yaml => serde_yaml::to_string(report)?,
        OutputFormat::Json => serde_json::to_string_pretty(report)? + "\n",
    })
}

async fn input_text(text: Option<String>) -> Result<String> {
    match text {
        Some(text) => Ok(text),
        None => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match cli.command {
        Commands::Plan {
            fixture,
            config,
            templating,
            format,
        } => {
            let mut engine_config = load_config(config.as_deref()).await?;
            if templating {
                engine_config.templating_enabled = true;
            }

            let fixture = load_fixture(&fixture).await?;
            info!("Planning customization of {}/{}", fixture.vm.namespace, fixture.vm.name);

            let report = plan(&Session::new(engine_config), &fixture).await?;
            print!("{}", render(&report, format)?);
        }
        Commands::Encode { text } => {
            let text = input_text(text).await?;
            println!("{}", encode_gzip_base64(&text)?);
        }
        Commands::Decode { text } => {
            let text = input_text(text).await?;
            print!("{}", try_decode_gzip_base64(&text)?);
        }
    }

    Ok(())
}
