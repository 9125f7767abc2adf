//! Galax CLI - Galaxy configuration repository with template instancing.

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use galax::{
    Client, Condition, ConfigObject, Daemon, DaemonConfig, ExportFormat, Galaxy, Node, ObjectKind,
    ensure_instance, is_daemon_running, load_package, resolve_instance,
};
use log::info;
use std::fs;
use std::path::PathBuf;

mod cli;

use cli::{Cli, Command};

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("galax")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("galax.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn get_node_dir(cli: &Cli) -> PathBuf {
    cli.dir
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn format_kind(kind: &ObjectKind) -> ColoredString {
    match kind {
        ObjectKind::Template => "template".yellow(),
        ObjectKind::Instance => "instance".green(),
    }
}

/// Open a galaxy and log in with the credentials from the command line.
fn open_logged_in(node: &Node, name: &str, user: &str, password: &str) -> Result<Galaxy> {
    let mut galaxy = node.open_galaxy(name)?;
    galaxy.login(user, password)?;
    Ok(galaxy)
}

fn print_ensured(object: &ConfigObject) {
    match (&object.area, &object.host) {
        (Some(area), _) => {
            println!("{} Ensured: {} in area {}", "✓".green(), object.tagname.cyan(), area.cyan())
        }
        (_, Some(host)) => {
            println!("{} Ensured: {} on host {}", "✓".green(), object.tagname.cyan(), host.cyan())
        }
        _ => println!("{} Ensured: {}", "✓".green(), object.tagname.cyan()),
    }
}

fn run(cli: Cli) -> Result<()> {
    let node_dir = get_node_dir(&cli);
    let node = Node::new(&node_dir);
    let user = cli.user.clone();
    let password = cli.password.clone();

    match cli.command {
        Command::CreateGalaxy { name } => {
            let galaxy_password = (!password.is_empty()).then_some(password.as_str());
            node.create_galaxy(&name, galaxy_password)?;

            println!("{} Created galaxy {}", "✓".green(), name.cyan());
        }

        Command::Galaxies => {
            let galaxies = node.query_galaxies().context("Failed to query galaxies")?;

            if galaxies.is_empty() {
                println!("{}", "No galaxies on node".dimmed());
            } else {
                for galaxy in galaxies {
                    println!(
                        "{} {} object(s), created {}",
                        galaxy.name.cyan(),
                        galaxy.object_count,
                        galaxy.created_at.format("%Y-%m-%d").to_string().dimmed()
                    );
                }
            }
        }

        Command::Ensure {
            galaxy,
            tagname,
            template,
            parent,
        } => {
            let mut galaxy = open_logged_in(&node, &galaxy, &user, &password)?;

            let parent_object = match &parent {
                Some(name) => Some(resolve_instance(&galaxy, name)?),
                None => None,
            };

            let instance =
                ensure_instance(&mut galaxy, &tagname, &template, parent_object.as_ref())?;
            print_ensured(&instance);
        }

        Command::Derive { galaxy, tagname, from } => {
            let mut galaxy = open_logged_in(&node, &galaxy, &user, &password)?;
            let template = galaxy
                .create_template(&tagname, &from)
                .context("Failed to derive template")?;

            println!("{} Derived: {} from {}", "✓".green(), template.tagname.cyan(), from.cyan());
        }

        Command::Get { galaxy, tagname } => {
            let galaxy = open_logged_in(&node, &galaxy, &user, &password)?;
            let object = galaxy.get_object(&tagname).context("Failed to get object")?;

            match object {
                Some(object) => {
                    println!("{}: {}", "Tagname".bold(), object.tagname.cyan());
                    println!("{}: {}", "Kind".bold(), format_kind(&object.kind));
                    println!("{}: {}", "Based on".bold(), object.based_on);
                    if let Some(derived_from) = &object.derived_from {
                        println!("{}: {}", "Derived from".bold(), derived_from);
                    }
                    if let Some(area) = &object.area {
                        println!("{}: {}", "Area".bold(), area);
                    }
                    if let Some(host) = &object.host {
                        println!("{}: {}", "Host".bold(), host);
                    }
                    println!("{}: {}", "Created".bold(), object.created_at);
                    println!("{}: {}", "Updated".bold(), object.updated_at);
                }
                None => {
                    eprintln!("{} Object not found: {}", "✗".red(), tagname);
                    std::process::exit(1);
                }
            }
        }

        Command::List {
            galaxy,
            templates,
            like,
            based_on,
        } => {
            let galaxy = open_logged_in(&node, &galaxy, &user, &password)?;

            let kind = if templates {
                ObjectKind::Template
            } else {
                ObjectKind::Instance
            };
            let condition = match (based_on, like) {
                (Some(base), _) => Condition::BasedOn(base),
                (None, Some(pattern)) => Condition::NamedLike(pattern),
                (None, None) => Condition::NamedLike("%".to_string()),
            };

            let set = galaxy.query_objects(kind, &condition).context("Failed to query objects")?;

            if set.is_empty() {
                println!("{}", "No objects found".dimmed());
            } else {
                for object in set.iter() {
                    let parent = object
                        .area
                        .as_ref()
                        .map(|a| format!(" area:{}", a))
                        .or_else(|| object.host.as_ref().map(|h| format!(" host:{}", h)))
                        .unwrap_or_default();
                    println!(
                        "{} {} {}{}",
                        format_kind(&object.kind),
                        object.tagname.cyan(),
                        object.based_on.dimmed(),
                        parent.dimmed()
                    );
                }
            }
        }

        Command::Export {
            galaxy,
            names,
            format,
            output,
        } => {
            let format: ExportFormat = format.parse().map_err(|e: String| eyre::eyre!(e))?;
            let path = output.unwrap_or_else(|| {
                PathBuf::from(format!("{}.package.{}", galaxy, format.extension()))
            });

            let open = open_logged_in(&node, &galaxy, &user, &password)?;
            let name_refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
            let summary = open
                .export_objects(&name_refs, format, &path)
                .context("Failed to export package")?;

            println!(
                "{} Exported {} of {} object(s) to {}",
                "✓".green(),
                summary.exported,
                summary.requested,
                summary.path.display()
            );
            println!("  {}: {}", "digest".bold(), summary.digest);
            if summary.exported < summary.requested {
                println!(
                    "{} {} requested object(s) not found",
                    "→".blue(),
                    summary.requested - summary.exported
                );
            }
        }

        Command::Verify { path } => {
            let package = load_package(&path)?;

            println!(
                "{} Package OK: {} object(s) from {}",
                "✓".green(),
                package.manifest.object_count,
                package.manifest.galaxy.cyan()
            );
            println!("  {}: {}", "digest".bold(), package.manifest.digest);
        }

        Command::Demo { output } => {
            let galaxies = node.query_galaxies().context("Failed to query galaxies")?;
            let Some(first) = galaxies.first() else {
                eprintln!(
                    "{} No galaxies on node. Create one with 'gx create-galaxy <name>'",
                    "✗".red()
                );
                std::process::exit(1);
            };
            println!("{} Found galaxy {}", "→".blue(), first.name.cyan());

            let mut galaxy = open_logged_in(&node, &first.name, &user, &password)?;
            println!("{} Logged in to {}", "✓".green(), first.name.cyan());

            let platform = ensure_instance(&mut galaxy, "GRPlatform", "$WinPlatform", None)?;
            print_ensured(&platform);

            let engine = ensure_instance(&mut galaxy, "AppEngine", "$AppEngine", Some(&platform))?;
            print_ensured(&engine);

            let area = ensure_instance(&mut galaxy, "MainArea", "$Area", Some(&engine))?;
            print_ensured(&area);

            let tank = ensure_instance(&mut galaxy, "MainTank", "$UserDefined", Some(&area))?;
            print_ensured(&tank);

            let names = ["GRPlatform", "AppEngine", "MainTank"];
            let set = galaxy.query_objects_by_name(ObjectKind::Instance, &names)?;
            println!("{} {} instance(s) provisioned:", "→".blue(), set.len());
            for object in set.iter() {
                println!("  {} based on {}", object.tagname.cyan(), object.based_on);
            }

            let path = output
                .unwrap_or_else(|| PathBuf::from(format!("{}.package.json", first.name)));
            let summary = galaxy.export_objects(&names, ExportFormat::Json, &path)?;

            println!(
                "{} Exported {} object(s) to {}",
                "✓".green(),
                summary.exported,
                summary.path.display()
            );
        }

        Command::Daemon => {
            println!("{} Starting daemon for {}", "→".blue(), node_dir.display());

            let config = DaemonConfig::new(&node_dir);
            let mut daemon = Daemon::new(config);

            // Run daemon in async runtime
            let rt = tokio::runtime::Runtime::new().context("Failed to create runtime")?;
            rt.block_on(async { daemon.run().await }).context("Daemon error")?;
        }

        Command::DaemonStop => {
            if !is_daemon_running(&node_dir) {
                println!("{} Daemon is not running", "✗".red());
                std::process::exit(1);
            }

            let mut client = Client::connect(&node_dir, false).context("Failed to connect to daemon")?;
            client.shutdown().context("Failed to shutdown daemon")?;
            println!("{} Daemon stopped", "✓".green());
        }

        Command::DaemonStatus => {
            if is_daemon_running(&node_dir) {
                println!("{} Daemon is running", "✓".green());

                // Try to ping
                if let Ok(mut client) = Client::connect(&node_dir, false)
                    && client.ping().is_ok()
                {
                    println!("  {} Responding to requests", "✓".green());
                }
            } else {
                println!("{} Daemon is not running", "✗".red());
            }
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    info!("Command: {:?}", std::env::args().collect::<Vec<_>>());

    if let Err(e) = run(cli) {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
