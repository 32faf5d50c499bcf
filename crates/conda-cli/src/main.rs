//! conda-envs: command line front-end for the notebook conda service.
//!
//! Talks to the same `conda/` REST endpoints the notebook environment
//! browser uses, so environments and packages can be managed from a shell.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use conda_client::{
    load_config, Environment, EnvironmentManager, PackageFilter, PackageManager, UnifiedPackage,
};
use log::debug;
use tabled::{settings::Style, Table, Tabled};

#[derive(Parser, Debug)]
#[command(name = "conda-envs")]
#[command(author, version, about = "Manage conda environments through a notebook server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Notebook server URL (default: settings file, then CONDA_CLIENT_URL)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Log level
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Environment management
    Env {
        #[command(subcommand)]
        command: EnvCommands,
    },
    /// Package management inside one environment
    Pkg {
        #[command(subcommand)]
        command: PkgCommands,
    },
    /// List configured channels
    Channels {
        /// Environment the listing is requested for
        #[arg(long, default_value = "base")]
        env: String,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum EnvCommands {
    /// List environments
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Create an environment
    Create {
        name: String,
        /// python3, python2, r, or a space-separated package list
        #[arg(long = "type")]
        env_type: Option<String>,
    },
    /// Clone an environment
    Clone { source: String, name: String },
    /// Create an environment from a specification file
    Import { name: String, file: PathBuf },
    /// Update an environment from a specification file
    Update { name: String, file: PathBuf },
    /// Export an environment specification
    Export {
        name: String,
        /// Only list explicitly requested packages
        #[arg(long)]
        from_history: bool,
        /// Write to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Remove an environment
    Remove { name: String },
}

#[derive(Subcommand, Debug)]
enum PkgCommands {
    /// List packages
    List {
        env: String,
        /// installed, available, all or updatable
        #[arg(long, default_value = "installed")]
        filter: PackageFilter,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Install packages
    Install {
        env: String,
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// Install a local package in development mode
    Develop { env: String, path: PathBuf },
    /// Update packages
    Update {
        env: String,
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// Remove packages
    Remove {
        env: String,
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// List packages with an available update
    Updates { env: String },
}

#[derive(Tabled)]
struct EnvironmentRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "DEFAULT")]
    default: String,
    #[tabled(rename = "DIRECTORY")]
    directory: String,
}

impl From<&Environment> for EnvironmentRow {
    fn from(env: &Environment) -> Self {
        EnvironmentRow {
            name: env.name.clone(),
            default: if env.is_default { "*" } else { "" }.to_string(),
            directory: env.directory.display().to_string(),
        }
    }
}

#[derive(Tabled)]
struct PackageRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "INSTALLED")]
    installed: String,
    #[tabled(rename = "LATEST")]
    latest: String,
    #[tabled(rename = "CHANNEL")]
    channel: String,
    #[tabled(rename = "STATUS")]
    status: String,
}

impl From<&UnifiedPackage> for PackageRow {
    fn from(pkg: &UnifiedPackage) -> Self {
        let mut status = pkg.status.to_string();
        if pkg.updatable {
            status.push_str(" (update)");
        }
        PackageRow {
            name: pkg.name.clone(),
            installed: pkg
                .version_installed
                .clone()
                .unwrap_or_else(|| "-".to_string()),
            latest: pkg.version.last().cloned().unwrap_or_else(|| "-".to_string()),
            channel: pkg.channel.clone(),
            status,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    let mut config = load_config();
    if let Some(url) = cli.url {
        config.base_url = url;
    }
    debug!("Using conda service at {}", config.base_url);

    let manager = EnvironmentManager::from_config(&config)?;

    match cli.command {
        Commands::Env { command } => run_env_command(&manager, command).await,
        Commands::Pkg { command } => run_pkg_command(&manager, command).await,
        Commands::Channels { env, json } => {
            let channels = manager.channels(&env).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&channels)?);
            } else {
                for (name, uris) in &channels {
                    println!("{}", name);
                    for uri in uris {
                        println!("  {}", uri);
                    }
                }
            }
            Ok(())
        }
    }
}

async fn run_env_command(manager: &EnvironmentManager, command: EnvCommands) -> Result<()> {
    let mut changes = manager.subscribe();

    match command {
        EnvCommands::List { json } => {
            let envs = manager.environments().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&envs)?);
            } else if envs.is_empty() {
                println!("No environments found.");
            } else {
                let rows: Vec<EnvironmentRow> = envs.iter().map(EnvironmentRow::from).collect();
                let table = Table::new(rows).with(Style::rounded()).to_string();
                println!("{}", table);
            }
            return Ok(());
        }
        EnvCommands::Create { name, env_type } => {
            manager.create(&name, env_type.as_deref()).await?;
        }
        EnvCommands::Clone { source, name } => {
            manager.clone_environment(&source, &name).await?;
        }
        EnvCommands::Import { name, file } => {
            let content = tokio::fs::read_to_string(&file).await?;
            manager.import(&name, &content, &file_name(&file)).await?;
        }
        EnvCommands::Update { name, file } => {
            let content = tokio::fs::read_to_string(&file).await?;
            manager.update(&name, &content, &file_name(&file)).await?;
        }
        EnvCommands::Export {
            name,
            from_history,
            output,
        } => {
            let response = manager.export(&name, from_history).await?;
            let spec = response.bytes().await?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, &spec).await?;
                    println!("Exported {} to {}", name, path.display());
                }
                None => print!("{}", String::from_utf8_lossy(&spec)),
            }
            return Ok(());
        }
        EnvCommands::Remove { name } => {
            manager.remove(&name).await?;
        }
    }

    while let Ok(change) = changes.try_recv() {
        match &change.source {
            Some(source) => println!("{:?} {} (from {})", change.kind, change.name, source),
            None => println!("{:?} {}", change.kind, change.name),
        }
    }
    Ok(())
}

async fn run_pkg_command(manager: &EnvironmentManager, command: PkgCommands) -> Result<()> {
    match command {
        PkgCommands::List { env, filter, json } => {
            let packages = manager.package_manager(Some(&env));
            let list: Vec<UnifiedPackage> = packages
                .refresh(filter)
                .await?
                .into_iter()
                .filter(|p| filter.matches(p))
                .collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&list)?);
            } else if list.is_empty() {
                println!("No {} packages in {}.", filter, env);
            } else {
                let rows: Vec<PackageRow> = list.iter().map(PackageRow::from).collect();
                let table = Table::new(rows).with(Style::rounded()).to_string();
                println!("{}", table);
            }
            Ok(())
        }
        PkgCommands::Updates { env } => {
            let updates = manager.package_manager(Some(&env)).check_updates().await?;
            if updates.is_empty() {
                println!("All packages in {} are up to date.", env);
            } else {
                for name in updates {
                    println!("{}", name);
                }
            }
            Ok(())
        }
        PkgCommands::Install { env, packages } => {
            let pm = manager.package_manager(Some(&env));
            report(&pm, pm.install(&packages)).await
        }
        PkgCommands::Develop { env, path } => {
            let pm = manager.package_manager(Some(&env));
            let path = path.to_string_lossy().to_string();
            report(&pm, pm.develop(&path)).await
        }
        PkgCommands::Update { env, packages } => {
            let pm = manager.package_manager(Some(&env));
            report(&pm, pm.update(&packages)).await
        }
        PkgCommands::Remove { env, packages } => {
            let pm = manager.package_manager(Some(&env));
            report(&pm, pm.remove(&packages)).await
        }
    }
}

/// Run a package mutation and print the change it produced.
async fn report<F>(pm: &PackageManager, operation: F) -> Result<()>
where
    F: std::future::Future<Output = Result<(), conda_client::OperationError>>,
{
    let mut changes = pm.subscribe();
    operation.await?;
    while let Ok(change) = changes.try_recv() {
        println!(
            "{:?} {} in {}",
            change.kind,
            change.packages.join(" "),
            change.environment
        );
    }
    Ok(())
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "environment.yml".to_string())
}
