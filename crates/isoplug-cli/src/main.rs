use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use isoplug_core::{
    config::{self, Tool, ToolchainConfig},
    settings,
    synth::{classify, Bitness, IconSource, SynthOptions, Synthesizer},
    Resolver,
};
use isoplug_plugin_sdk::CapabilityKind;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "isoplug", author, version, about = "Host wrappers for isolated plugin libraries")]
struct Cli {
    /// Sets the log level (error, warn, info, debug, trace).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a wrapper that exports only what the plugin library implements.
    Synth(SynthArgs),
    /// Show the plugin types of a library and the exports each kind would drop.
    Inspect {
        #[arg(value_name = "LIBRARY")]
        library: PathBuf,
        /// Separate content library, for file-system plugins.
        #[arg(long, value_name = "LIBRARY")]
        content: Option<PathBuf>,
        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Work with wrapper settings files.
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
    /// Work with synthesizer toolchain files.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Args, Debug)]
struct SynthArgs {
    /// Capability kind of the stock template to use (fs, content, packer, lister, qs).
    #[arg(short, long, value_name = "KIND", required_unless_present = "template")]
    kind: Option<CapabilityKind>,
    /// Use this wrapper template instead of the stock one.
    #[arg(short = 'w', long, value_name = "FILE")]
    template: Option<PathBuf>,
    /// Plugin library implementing the capability contract.
    #[arg(short, long, value_name = "LIBRARY")]
    plugin: PathBuf,
    /// Content library, when a file-system plugin keeps its fields elsewhere.
    #[arg(short, long, value_name = "LIBRARY")]
    content: Option<PathBuf>,
    /// Output wrapper name (folder optional, extension ignored).
    #[arg(short, long, value_name = "NAME")]
    output: Option<PathBuf>,
    /// Icon file embedded in the wrapper.
    #[arg(short, long, value_name = "FILE", conflicts_with = "icon_from_plugin")]
    icon: Option<PathBuf>,
    /// Take the icon named in the plugin library's manifest.
    #[arg(long)]
    icon_from_plugin: bool,
    /// Optimize the assembled wrapper.
    #[arg(long)]
    release: bool,
    /// Build only the 32-bit wrapper.
    #[arg(long, conflicts_with = "x64")]
    x32: bool,
    /// Build only the 64-bit wrapper.
    #[arg(long)]
    x64: bool,
    /// Toolchain file.
    #[arg(long, value_name = "FILE", default_value = "isoplug.toml")]
    config: PathBuf,
    #[arg(long, value_name = "PATH")]
    assembler: Option<PathBuf>,
    #[arg(long, value_name = "PATH")]
    disassembler: Option<PathBuf>,
    #[arg(long, value_name = "PATH")]
    resource_compiler: Option<PathBuf>,
    /// Archiver used for the installation archive.
    #[arg(long, value_name = "PATH")]
    archiver: Option<PathBuf>,
    /// Skip the installation archive.
    #[arg(long)]
    no_archive: bool,
    /// Remove the work directory afterwards.
    #[arg(long)]
    clear_work_dir: bool,
}

#[derive(Subcommand, Debug)]
enum SettingsCommands {
    /// Checks the settings of a wrapper (or a settings file) for unknown keys
    /// and malformed values.
    Validate {
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
    /// Prints a commented settings template.
    Example,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Validates the provided toolchain file.
    Validate {
        #[arg(value_name = "FILE")]
        config: PathBuf,
    },
    /// Prints the bundled example toolchain file.
    Example,
    /// Dumps the resolved toolchain as JSON.
    Diag {
        #[arg(value_name = "FILE", default_value = "isoplug.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    let result = match cli.command {
        Commands::Synth(args) => handle_synth(args).await,
        Commands::Inspect { library, content, json } => {
            handle_inspect(&library, content.as_deref(), json)
        }
        Commands::Settings { command } => handle_settings(command),
        Commands::Config { command } => handle_config(command),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            println!("ERROR: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).try_init().ok();
}

async fn handle_synth(args: SynthArgs) -> Result<()> {
    let toolchain = toolchain(&args)?;
    tracing::info!(plugin = %args.plugin.display(), kind = ?args.kind, "synthesizing wrapper");
    let options = SynthOptions {
        template: args.template,
        kind: args.kind,
        plugin: args.plugin,
        content: args.content,
        output: args.output,
        icon: match (args.icon, args.icon_from_plugin) {
            (Some(icon), _) => IconSource::File(icon),
            (None, true) => IconSource::FromManifest,
            (None, false) => IconSource::None,
        },
        release: args.release,
        bitness: match (args.x32, args.x64) {
            (true, false) => Bitness::X32,
            (false, true) => Bitness::X64,
            _ => Bitness::Both,
        },
    };
    let report = Synthesizer::new(toolchain).run(&options).await?;

    if let Some(kind) = report.kind {
        println!("plugin type : {kind}");
    }
    println!("exports     : {}", report.exports.len());
    if report.excluded.is_empty() {
        println!("excluded    : none");
    } else {
        println!("excluded    :");
        for method in &report.excluded {
            println!("  - {method}");
        }
    }
    for output in &report.outputs {
        println!("wrapper     : {}", output.display());
    }
    for warning in &report.warnings {
        println!("WARNING: {warning}");
    }
    Ok(())
}

/// Toolchain file values, overridden by command-line flags.
fn toolchain(args: &SynthArgs) -> Result<ToolchainConfig> {
    let mut cfg = config::load_config(&args.config)?;
    if let Some(path) = &args.assembler {
        cfg.assembler.path = path.clone();
    }
    if let Some(path) = &args.disassembler {
        cfg.disassembler.path = path.clone();
    }
    if let Some(path) = &args.resource_compiler {
        match &mut cfg.resource_compiler {
            Some(rc) => rc.path = path.clone(),
            None => cfg.resource_compiler = Some(Tool::resource_compiler(path)),
        }
    }
    if let Some(path) = &args.archiver {
        match &mut cfg.archiver {
            Some(archiver) => archiver.path = path.clone(),
            None => cfg.archiver = Some(Tool::archiver(path)),
        }
    }
    if args.no_archive {
        cfg.install_archive = false;
    }
    cfg.clear_work_dir |= args.clear_work_dir;
    cfg.validate()
        .with_context(|| format!("invalid toolchain {}", args.config.display()))?;
    Ok(cfg)
}

fn handle_inspect(library: &Path, content: Option<&Path>, json: bool) -> Result<()> {
    let resolver = Resolver::new();
    let manifest = resolver.load_manifest(library)?;
    let mut kinds = Vec::new();
    for kind in CapabilityKind::ALL {
        let types = resolver.types_implementing(library, kind.contract())?;
        if types.is_empty() {
            continue;
        }
        let excluded = classify::exclusions(&resolver, library, content, kind)
            .map(|excl| excl.iter().map(str::to_string).collect::<Vec<_>>())
            .map_err(|err| err.to_string());
        kinds.push(serde_json::json!({
            "kind": kind.short_name(),
            "types": types.iter().map(|ty| &ty.full_name).collect::<Vec<_>>(),
            "excluded": excluded.as_ref().ok(),
            "error": excluded.as_ref().err(),
        }));
    }
    if json {
        let out = serde_json::json!({
            "library": manifest.name,
            "version": manifest.version,
            "capabilities": kinds,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!(
        "{} {}",
        manifest.name,
        manifest.version.as_deref().map(|v| format!("v{v}")).unwrap_or_default()
    );
    if kinds.is_empty() {
        bail!("{} implements no capability contract", library.display());
    }
    for entry in &kinds {
        println!("- {} ({})", entry["kind"].as_str().unwrap_or_default(), entry["types"]);
        match (entry["excluded"].as_array(), entry["error"].as_str()) {
            (_, Some(err)) => println!("    not synthesizable: {err}"),
            (Some(excluded), _) if excluded.is_empty() => println!("    every export kept"),
            (Some(excluded), _) => {
                for method in excluded {
                    println!("    excluded {}", method.as_str().unwrap_or_default());
                }
            }
            (None, None) => {}
        }
    }
    Ok(())
}

fn handle_settings(command: SettingsCommands) -> Result<()> {
    match command {
        SettingsCommands::Validate { path } => {
            let file = if path.extension().is_some_and(|ext| ext == "toml") {
                path.clone()
            } else {
                settings::settings_path(&path)
            };
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read settings file {}", file.display()))?;
            let parsed = settings::parse_settings(&raw)
                .with_context(|| format!("failed to parse {}", file.display()))?;
            for warning in settings::validate(&parsed)? {
                println!("WARNING: {warning}");
            }
            println!("settings OK: {}", file.display());
        }
        SettingsCommands::Example => print!("{}", settings::example_settings()),
    }
    Ok(())
}

fn handle_config(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Validate { config } => {
            if !config.exists() {
                bail!("config file {} does not exist", config.display());
            }
            let cfg = config::load_config(&config)?;
            cfg.validate()?;
            println!("configuration OK: {}", config.display());
        }
        ConfigCommands::Example => {
            print!("{}", include_str!("../../../config/isoplug.example.toml"));
        }
        ConfigCommands::Diag { config } => {
            let cfg = config::load_config(&config)?;
            println!("{}", serde_json::to_string_pretty(&cfg)?);
        }
    }
    Ok(())
}
