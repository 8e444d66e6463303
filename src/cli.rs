use crate::{
    app::App,
    config::AppPaths,
    egg, game,
    installer::InstallStrategy,
    lang::{Language, Message},
    logging, tutorial,
    update::UpdateStatus,
};
use anyhow::{bail, Result};
use serde::Serialize;
use std::{path::PathBuf, process::ExitCode};
use tracing::error;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "json" => Some(OutputFormat::Json),
            "text" => Some(OutputFormat::Text),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct GlobalOptions {
    format: OutputFormat,
    verbose: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum CliCommand {
    Status,
    RootShow,
    RootSet(PathBuf),
    RootClear,
    Import(Vec<PathBuf>),
    List,
    Remove(String),
    Install {
        target: String,
        strategy: InstallStrategy,
    },
    Folder,
    Lang(Option<LangChoice>),
    EggChance(Option<u32>),
    Tutorial { reset: bool },
    Update { force: bool },
    Logs,
    Paths,
    Help,
    Version,
}

#[derive(Debug, PartialEq, Eq)]
enum LangChoice {
    Set(Language),
    Toggle,
}

pub fn run() -> Result<ExitCode> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (global, tokens) = parse_global_options(&args)?;
    let command = parse_command(&tokens)?;
    match command {
        CliCommand::Help => {
            print_help();
            return Ok(ExitCode::SUCCESS);
        }
        CliCommand::Version => {
            println!("forest-modman v{}", env!("CARGO_PKG_VERSION"));
            return Ok(ExitCode::SUCCESS);
        }
        _ => {}
    }

    let paths = AppPaths::discover()?;
    if let Err(err) = logging::init(&paths.logs_dir, global.verbose) {
        eprintln!("logging disabled: {err:#}");
    }

    let mut app = App::initialize(paths)?;
    match run_command(&mut app, command, global.format) {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => {
            error!("{err:#}");
            let detail = format!("{err:#}");
            eprintln!("{}", app.format(Message::Error, &[("error", &detail)]));
            Ok(ExitCode::FAILURE)
        }
    }
}

fn parse_global_options(args: &[String]) -> Result<(GlobalOptions, Vec<String>)> {
    let mut format = OutputFormat::Text;
    let mut verbose = false;
    let mut tokens = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if let Some(value) = arg.strip_prefix("--format=") {
            format = OutputFormat::parse(value)
                .ok_or_else(|| anyhow::anyhow!("Unknown format: {value}"))?;
            continue;
        }
        match arg.as_str() {
            "--format" => {
                let Some(value) = iter.next() else {
                    bail!("--format requires a value");
                };
                format = OutputFormat::parse(value)
                    .ok_or_else(|| anyhow::anyhow!("Unknown format: {value}"))?;
            }
            "--verbose" | "-v" => verbose = true,
            _ => tokens.push(arg.to_string()),
        }
    }
    Ok((GlobalOptions { format, verbose }, tokens))
}

fn parse_command(tokens: &[String]) -> Result<CliCommand> {
    let Some(head) = tokens.first() else {
        return Ok(CliCommand::Status);
    };
    let rest = &tokens[1..];
    let command = match head.as_str() {
        "status" => CliCommand::Status,
        "root" => match rest.first().map(String::as_str) {
            None | Some("show") => CliCommand::RootShow,
            Some("set") => {
                let Some(dir) = rest.get(1) else {
                    bail!("root set requires a directory");
                };
                CliCommand::RootSet(PathBuf::from(dir))
            }
            Some("clear") => CliCommand::RootClear,
            Some(other) => bail!("Unknown root command: {other} (use 'show', 'set', or 'clear')"),
        },
        "import" => {
            if rest.is_empty() {
                bail!("import requires one or more ZIP paths");
            }
            CliCommand::Import(rest.iter().map(PathBuf::from).collect())
        }
        "list" | "mods" => CliCommand::List,
        "remove" | "rm" => {
            let Some(name) = rest.first() else {
                bail!("remove requires an archive name");
            };
            CliCommand::Remove(name.to_string())
        }
        "install" => {
            let mut target = None;
            let mut strategy = InstallStrategy::Destructive;
            for arg in rest {
                match arg.as_str() {
                    "--staged" => strategy = InstallStrategy::Staged,
                    value if value.starts_with("--") => bail!("Unknown install option: {value}"),
                    value => {
                        if target.replace(value.to_string()).is_some() {
                            bail!("install takes a single archive");
                        }
                    }
                }
            }
            let Some(target) = target else {
                bail!("install requires an archive name or ZIP path");
            };
            CliCommand::Install { target, strategy }
        }
        "folder" | "open" => CliCommand::Folder,
        "lang" | "language" => {
            let choice = match rest.first().map(String::as_str) {
                None => None,
                Some("toggle") => Some(LangChoice::Toggle),
                Some(code) => match Language::from_code(code) {
                    Some(language) => Some(LangChoice::Set(language)),
                    None => bail!("Unknown language: {code} (use 'en', 'pl', or 'toggle')"),
                },
            };
            CliCommand::Lang(choice)
        }
        "egg-chance" => {
            let chance = match rest.first() {
                Some(value) => Some(
                    value
                        .parse::<u32>()
                        .map_err(|_| anyhow::anyhow!("egg-chance expects 0-100, got {value}"))?,
                ),
                None => None,
            };
            CliCommand::EggChance(chance)
        }
        "tutorial" => {
            let mut reset = false;
            for arg in rest {
                match arg.as_str() {
                    "--reset" => reset = true,
                    other => bail!("Unknown tutorial option: {other}"),
                }
            }
            CliCommand::Tutorial { reset }
        }
        "update" => {
            let mut force = false;
            for arg in rest {
                match arg.as_str() {
                    "--force" => force = true,
                    other => bail!("Unknown update option: {other}"),
                }
            }
            CliCommand::Update { force }
        }
        "logs" => CliCommand::Logs,
        "paths" => CliCommand::Paths,
        "help" | "--help" | "-h" => CliCommand::Help,
        "version" | "--version" | "-V" => CliCommand::Version,
        other => bail!("Unknown command: {other} (see 'forest-modman help')"),
    };
    Ok(command)
}

fn run_command(app: &mut App, command: CliCommand, format: OutputFormat) -> Result<()> {
    match command {
        CliCommand::Status => show_status(app, format),
        CliCommand::RootShow => show_root(app, format),
        CliCommand::RootSet(dir) => {
            let root = app.select_install_root(&dir)?;
            let folder = root
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| root.display().to_string());
            println!("{}", app.format(Message::RootSaved, &[("folder", &folder)]));
            Ok(())
        }
        CliCommand::RootClear => {
            app.clear_install_root()?;
            println!("{}", app.text(Message::RootCleared));
            Ok(())
        }
        CliCommand::Import(paths) => {
            for path in paths {
                let cached = app.import_archive(&path)?;
                let name = cached
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_default();
                println!("{}", app.format(Message::ArchiveAdded, &[("name", &name)]));
            }
            Ok(())
        }
        CliCommand::List => list_archives(app, format),
        CliCommand::Remove(name) => {
            if !app.remove_archive(&name)? {
                bail!("no imported archive named {name}");
            }
            println!("{}", app.format(Message::ArchiveRemoved, &[("name", &name)]));
            Ok(())
        }
        CliCommand::Install { target, strategy } => {
            let report = app.install(&target, strategy)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Text => {
                    println!("{}", app.text(Message::InstallSucceeded));
                    let files = report.files.to_string();
                    let folder = report.mod_dir.display().to_string();
                    let removed = report.removed.to_string();
                    println!(
                        "{}",
                        app.format(
                            Message::InstallSummary,
                            &[("files", &files), ("folder", &folder), ("removed", &removed)],
                        )
                    );
                    if egg::roll_now(app.settings.egg_chance) {
                        println!("{}", egg::deer());
                    }
                }
            }
            Ok(())
        }
        CliCommand::Folder => {
            println!("{}", app.mods_folder()?.display());
            Ok(())
        }
        CliCommand::Lang(choice) => {
            match choice {
                Some(LangChoice::Toggle) => {
                    app.toggle_language()?;
                }
                Some(LangChoice::Set(language)) => app.set_language(language)?,
                None => {
                    let language = app.language();
                    println!("{} (switch: {})", language.code(), language.switch_label());
                    return Ok(());
                }
            }
            println!("{}", app.text(Message::LanguageChanged));
            Ok(())
        }
        CliCommand::EggChance(chance) => {
            let value = match chance {
                Some(chance) => app.set_egg_chance(chance)?,
                None => app.settings.egg_chance,
            };
            println!("{value}%");
            Ok(())
        }
        CliCommand::Tutorial { reset } => {
            if reset {
                app.set_tutorial_shown(false)?;
                println!("{}", app.text(Message::TutorialReset));
                return Ok(());
            }
            print_tutorial(app)
        }
        CliCommand::Update { force } => {
            let status = app.check_for_updates(force)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
                OutputFormat::Text => match status {
                    UpdateStatus::Available { version, url } => {
                        println!("{}", app.format(Message::UpdateAvailable, &[("version", &version)]));
                        println!("  {url}");
                    }
                    UpdateStatus::UpToDate => println!("{}", app.text(Message::UpToDate)),
                    UpdateStatus::Skipped => println!("{}", app.text(Message::UpdateSkipped)),
                },
            }
            Ok(())
        }
        CliCommand::Logs => {
            println!("{}", app.paths.logs_dir.display());
            if let Some(latest) = logging::latest_log(&app.paths.logs_dir) {
                println!("latest: {}", latest.display());
            }
            Ok(())
        }
        CliCommand::Paths => list_paths(app, format),
        CliCommand::Help | CliCommand::Version => Ok(()),
    }
}

fn show_status(app: &mut App, format: OutputFormat) -> Result<()> {
    let status = app.status()?;
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{} v{}", app.text(Message::AppTitle), env!("CARGO_PKG_VERSION"));
    match (&status.install_root, status.install_root_valid) {
        (Some(root), true) => {
            println!("MODAPI: {}", root.display());
            let count = status.installed_files.to_string();
            println!("{}", app.format(Message::InstalledFiles, &[("count", &count)]));
        }
        (Some(root), false) => {
            println!("MODAPI: {} ({})", root.display(), app.text(Message::InvalidRoot));
        }
        (None, _) => println!("{}", app.text(Message::SelectRootFirst)),
    }
    println!();
    print_archive_lines(app, &status.archives);

    if app.should_show_tutorial() {
        println!();
        print_tutorial(app)?;
    }
    Ok(())
}

#[derive(Serialize)]
struct RootView {
    install_root: Option<PathBuf>,
    valid: bool,
    mod_dir: Option<PathBuf>,
}

fn show_root(app: &mut App, format: OutputFormat) -> Result<()> {
    let status = app.status()?;
    let view = RootView {
        install_root: status.install_root,
        valid: status.install_root_valid,
        mod_dir: status.mod_dir,
    };
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&view)?),
        OutputFormat::Text => match &view.install_root {
            Some(root) => {
                let state = if view.valid {
                    Message::RootValid
                } else {
                    Message::RootInvalid
                };
                println!("{} ({})", root.display(), app.text(state));
            }
            None => println!("{}", app.text(Message::SelectRootFirst)),
        },
    }
    Ok(())
}

fn list_archives(app: &mut App, format: OutputFormat) -> Result<()> {
    let archives = app.archives()?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&archives)?),
        OutputFormat::Text => print_archive_lines(app, &archives),
    }
    Ok(())
}

fn print_archive_lines(app: &App, archives: &[crate::library::ArchiveInfo]) {
    if archives.is_empty() {
        println!("{}", app.text(Message::NoArchives));
        return;
    }
    for info in archives {
        let entries = info
            .entries
            .map(|count| format!("{count} entries"))
            .unwrap_or_else(|| "unreadable".to_string());
        let imported = info.imported_at.as_deref().unwrap_or("-");
        println!("{:<32} {:>12} {:>10}  {imported}", info.name, entries, format_size(info.size));
    }
}

fn print_tutorial(app: &mut App) -> Result<()> {
    println!("{}", tutorial::render(app.language()));
    app.set_tutorial_shown(true)
}

#[derive(Serialize)]
struct PathsView<'a> {
    #[serde(flatten)]
    paths: &'a AppPaths,
    mod_subpath: PathBuf,
}

fn list_paths(app: &App, format: OutputFormat) -> Result<()> {
    let view = PathsView {
        paths: &app.paths,
        mod_subpath: game::mod_subpath(),
    };
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&view)?),
        OutputFormat::Text => {
            println!("Settings:     {}", app.paths.config_file.display());
            println!("Data:         {}", app.paths.data_dir.display());
            println!("Mods cache:   {}", app.paths.mods_cache.display());
            println!("Logs:         {}", app.paths.logs_dir.display());
            println!("Install lock: {}", app.paths.install_lock.display());
            println!("Mod folder:   <MODAPI>/{}", view.mod_subpath.display());
        }
    }
    Ok(())
}

fn format_size(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let bytes = bytes as f64;
    if bytes < KIB {
        format!("{bytes} B")
    } else if bytes < KIB * KIB {
        format!("{:.1} KiB", bytes / KIB)
    } else {
        format!("{:.1} MiB", bytes / (KIB * KIB))
    }
}

fn print_help() {
    println!("forest-modman v{}", env!("CARGO_PKG_VERSION"));
    println!("Mod manager for {} (ModAPI)", game::DISPLAY_NAME);
    println!();
    println!("Usage:");
    println!("  forest-modman [status]               Show MODAPI folder and imported ZIPs");
    println!("  forest-modman root [show]            Show the MODAPI folder");
    println!("  forest-modman root set <dir>         Select the MODAPI folder");
    println!("  forest-modman root clear             Forget the MODAPI folder");
    println!("  forest-modman import <zip...>        Add ZIP files to the library");
    println!("  forest-modman list                   List imported ZIP files");
    println!("  forest-modman remove <name>          Remove an imported ZIP");
    println!("  forest-modman install <name|zip>     Replace mods/TheForest with a ZIP");
    println!("      --staged                         Extract first, then swap folders");
    println!("  forest-modman folder                 Print the mods/TheForest path");
    println!("  forest-modman lang [en|pl|toggle]    Show or change language");
    println!("  forest-modman egg-chance [0-100]     Show or change the easter egg chance");
    println!("  forest-modman tutorial [--reset]     Show the walkthrough");
    println!("  forest-modman update [--force]       Check for a newer release");
    println!("  forest-modman logs                   Show the log folder");
    println!("  forest-modman paths                  Show files used by the manager");
    println!();
    println!("Global options:");
    println!("  --format <json|text>                 Output format");
    println!("  -v, --verbose                        Log to stderr");
    println!("  -h, --help                           Show help");
    println!("  -V, --version                        Show version");
}
