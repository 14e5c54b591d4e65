use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use retroclass::backport::{convert_all, CallSiteCollector, ReplacementTable};
use retroclass::classfile::classpool::class_files_under;
use retroclass::classfile::verify::verify;
use retroclass::classfile::{read_class, ClassPool, ClassfileWritable, PoolKind};
use retroclass::{Config, Preset};

#[derive(Parser)]
#[command(name = "retroclass")]
#[command(about = "Retrofit class files for older virtual machines")]
#[command(version)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply replacement tables to every class under a directory
    Convert {
        /// Directory containing .class files
        #[arg(value_name = "INPUT_DIR")]
        input: PathBuf,

        /// Output directory for converted .class files
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,

        /// Replacement configuration (TOML)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Built-in replacement table appended after configured entries
        #[arg(long, value_name = "NAME")]
        preset: Option<Preset>,

        /// Check constant pool indices of converted classes
        #[arg(long)]
        verify: bool,
    },

    /// List the lambda call sites of a class file
    Lambdas {
        /// Input .class file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Directories of library classes used to resolve targets
        #[arg(long = "classpath", value_name = "DIR")]
        classpath: Vec<PathBuf>,
    },

    /// Validate a replacement configuration
    CheckConfig {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Commands::Convert { input, output, config, preset, verify } => {
            convert_dir(input, output, config.as_deref(), *preset, *verify)?;
        }
        Commands::Lambdas { input, classpath } => {
            list_lambdas(input, classpath)?;
        }
        Commands::CheckConfig { input } => {
            check_config(input)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn load_table(config: Option<&Path>, preset: Option<Preset>) -> Result<ReplacementTable> {
    let mut config = match config {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };
    if preset.is_some() {
        config.preset = preset;
    }
    Ok(ReplacementTable::from_config(&config)?)
}

fn convert_dir(input: &Path, output: &Path, config: Option<&Path>, preset: Option<Preset>, check: bool) -> Result<()> {
    let table = load_table(config, preset)?;
    if table.is_empty() {
        warn!("replacement table is empty; classes are copied unchanged");
    }

    let paths = class_files_under(input)?;
    let mut classes = Vec::with_capacity(paths.len());
    for path in &paths {
        let bytes = fs::read(path)?;
        let class = read_class(&bytes).with_context(|| format!("reading {}", path.display()))?;
        classes.push(class);
    }

    let results = convert_all(&table, &mut classes);

    let mut converted = 0;
    for ((path, class), result) in paths.iter().zip(&classes).zip(results) {
        let changed = result.with_context(|| format!("converting {}", path.display()))?;
        if changed {
            converted += 1;
            if check {
                verify(class).with_context(|| format!("verifying {}", path.display()))?;
            }
        }
        let relative = path.strip_prefix(input).unwrap_or(path);
        let target = output.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = class
            .to_classfile_bytes()
            .with_context(|| format!("writing {}", path.display()))?;
        fs::write(&target, bytes)?;
    }

    info!(classes = classes.len(), converted, "conversion finished");
    println!("{} classes processed, {} converted", classes.len(), converted);
    Ok(())
}

fn list_lambdas(input: &Path, classpath: &[PathBuf]) -> Result<()> {
    let bytes = fs::read(input)?;
    let class = read_class(&bytes).with_context(|| format!("reading {}", input.display()))?;

    let mut pool = ClassPool::new();
    for dir in classpath {
        pool.load_dir(PoolKind::Library, dir)?;
    }
    pool.insert(PoolKind::Program, class.clone())?;

    let records = CallSiteCollector::new(Some(&pool)).collect(&class)?;
    for record in records.values() {
        println!("{}", record);
        println!(
            "    stateless={} serializable={} method_reference={} accessor={}",
            record.is_stateless(),
            record.is_serializable(),
            record.is_method_reference()?,
            record.needs_accessor_method()
        );
    }
    println!("{} lambda call sites", records.len());
    Ok(())
}

fn check_config(input: &Path) -> Result<()> {
    let config = Config::load(input).with_context(|| format!("loading {}", input.display()))?;
    let table = ReplacementTable::from_config(&config)?;
    println!(
        "{}: {} type replacements, {} method replacements",
        input.display(),
        table.types().len(),
        table.methods().len()
    );
    Ok(())
}
