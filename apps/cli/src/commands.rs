//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use pebbles_core::{BlockSection, Library, Listing};
use pebbles_providers::{ProviderAdapter, ProviderSettings, RewriteMode};
use pebbles_shared::{
    AppConfig, CognitiveLevel, Folder, LevelContent, MainBody, Pebble, config_file_path,
    init_config, load_config, load_config_from,
};
use pebbles_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Pebbles: AI-generated knowledge artifacts, filed and edited locally.
#[derive(Parser)]
#[command(
    name = "pebbles",
    version,
    about = "Generate, file, and edit two-level knowledge artifacts.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Authenticated username; every record is owned by it.
    #[arg(long, env = "PEBBLES_USER", global = true)]
    pub user: Option<String>,

    /// Database path (overrides the config file).
    #[arg(long, env = "PEBBLES_DB", global = true)]
    pub db: Option<PathBuf>,

    /// Config file (defaults to ~/.pebbles/pebbles.toml).
    #[arg(long, env = "PEBBLES_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Generate a pebble on a topic and save it.
    Generate {
        /// Topic to generate.
        topic: String,

        /// Existing pebble to use as context (repeatable).
        #[arg(short, long = "context", value_name = "ID")]
        context: Vec<String>,

        /// Folder to file the new pebble in.
        #[arg(long)]
        folder: Option<String>,

        /// Print the stored pebble as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Rewrite a piece of text with the configured provider.
    Rewrite {
        /// Text to rewrite.
        text: String,

        /// improve, shorter, longer, or simplify (anything else means improve).
        #[arg(short, long, default_value = "improve")]
        mode: String,
    },

    /// List pebbles, newest first.
    List {
        /// List the trash instead.
        #[arg(long, conflicts_with_all = ["folder", "root", "search"])]
        deleted: bool,

        /// Only the folders and pebbles directly inside this folder.
        #[arg(long, conflicts_with_all = ["root", "search"])]
        folder: Option<String>,

        /// Only the folders and pebbles at the top level.
        #[arg(long, conflicts_with = "search")]
        root: bool,

        /// Pebbles and folders whose topic or name contains this text (any case).
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Show one pebble.
    Show {
        id: String,

        /// Only this level (ELI5 or ACADEMIC).
        #[arg(short, long)]
        level: Option<CognitiveLevel>,

        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Mark a pebble as verified.
    Verify { id: String },

    /// Change a pebble's topic.
    Rename { id: String, topic: String },

    /// Move pebbles into a folder, or to the root without --folder.
    Move {
        #[arg(required = true)]
        ids: Vec<String>,

        #[arg(long)]
        folder: Option<String>,
    },

    /// Move pebbles to the trash.
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Restore pebbles from the trash.
    Restore {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Edit a block's heading and/or body.
    Edit {
        id: String,

        #[arg(short, long, default_value = "ELI5")]
        level: CognitiveLevel,

        #[command(flatten)]
        target: BlockTarget,

        #[arg(long)]
        heading: Option<String>,

        /// New body; for key points, separate points with `|`.
        #[arg(long)]
        body: Option<String>,
    },

    /// Rewrite a block's body with the configured provider.
    RewriteBlock {
        id: String,

        #[arg(short, long, default_value = "ELI5")]
        level: CognitiveLevel,

        #[command(flatten)]
        target: BlockTarget,

        #[arg(short, long, default_value = "improve")]
        mode: String,
    },

    /// Replace a level's emoji collage.
    Emoji {
        id: String,

        #[arg(short, long, default_value = "ELI5")]
        level: CognitiveLevel,

        #[arg(required = true)]
        emojis: Vec<String>,
    },

    /// Folder management.
    Folder {
        #[command(subcommand)]
        action: FolderAction,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Exactly one of `--main <INDEX>` or `--sidebar <INDEX>`.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub(crate) struct BlockTarget {
    /// Main-content block index.
    #[arg(long, value_name = "INDEX")]
    main: Option<usize>,

    /// Sidebar block index.
    #[arg(long, value_name = "INDEX")]
    sidebar: Option<usize>,
}

impl BlockTarget {
    fn resolve(&self) -> Result<(BlockSection, usize)> {
        match (self.main, self.sidebar) {
            (Some(i), None) => Ok((BlockSection::Main, i)),
            (None, Some(i)) => Ok((BlockSection::Sidebar, i)),
            _ => Err(eyre!("pass exactly one of --main or --sidebar")),
        }
    }
}

/// Folder subcommands.
#[derive(Subcommand)]
pub(crate) enum FolderAction {
    /// Create a folder, optionally moving pebbles into it.
    Create {
        name: String,

        #[arg(long)]
        parent: Option<String>,

        /// Pebble to move into the new folder (repeatable).
        #[arg(long = "pebble", value_name = "ID")]
        pebbles: Vec<String>,
    },
    /// List folders as a tree.
    List,
    /// Rename a folder.
    Rename { id: String, name: String },
    /// Move a folder under another, or to the root without --parent.
    Move {
        id: String,

        #[arg(long)]
        parent: Option<String>,
    },
    /// Delete a folder, moving its contents up one level.
    Ungroup { id: String },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "pebbles=info",
        1 => "pebbles=debug",
        _ => "pebbles=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let env = Env {
        user: cli.user,
        db: cli.db,
        config: cli.config,
    };

    match cli.command {
        Command::Generate {
            topic,
            context,
            folder,
            json,
        } => cmd_generate(&env, &topic, &context, folder.as_deref(), json).await,
        Command::Rewrite { text, mode } => cmd_rewrite(&env, &text, &mode).await,
        Command::List {
            deleted,
            folder,
            root,
            search,
        } => {
            let scope = match (folder, root, search) {
                (_, _, Some(term)) => ListScope::Search(term),
                (Some(folder), _, _) => ListScope::Folder(Some(folder)),
                (None, true, None) => ListScope::Folder(None),
                (None, false, None) if deleted => ListScope::Trash,
                (None, false, None) => ListScope::All,
            };
            cmd_list(&env, scope).await
        }
        Command::Show { id, level, json } => cmd_show(&env, &id, level, json).await,
        Command::Verify { id } => {
            let pebble = env.library().await?.verify(&id).await?;
            println!("Verified: {}", pebble.topic);
            Ok(())
        }
        Command::Rename { id, topic } => {
            let pebble = env.library().await?.rename(&id, &topic).await?;
            println!("Renamed {} to \"{}\"", pebble.id, pebble.topic);
            Ok(())
        }
        Command::Move { ids, folder } => {
            let moved = env.library().await?.move_many(&ids, folder.as_deref()).await?;
            let target = folder.as_deref().unwrap_or("the root");
            for pebble in &moved {
                println!("Moved \"{}\" to {target}", pebble.topic);
            }
            Ok(())
        }
        Command::Delete { ids } => cmd_delete_or_restore(&env, &ids, true).await,
        Command::Restore { ids } => cmd_delete_or_restore(&env, &ids, false).await,
        Command::Edit {
            id,
            level,
            target,
            heading,
            body,
        } => cmd_edit(&env, &id, level, &target, heading, body).await,
        Command::RewriteBlock {
            id,
            level,
            target,
            mode,
        } => cmd_rewrite_block(&env, &id, level, &target, &mode).await,
        Command::Emoji { id, level, emojis } => {
            let pebble = env
                .library()
                .await?
                .set_emoji_collage(&id, level, emojis)
                .await?;
            println!("{level} collage: {}", pebble.content.level(level).emoji_collage.join(" "));
            Ok(())
        }
        Command::Folder { action } => cmd_folder(&env, action).await,
        Command::Config { action } => match action {
            ConfigAction::Init { force } => cmd_config_init(force),
            ConfigAction::Show => cmd_config_show(&env),
        },
    }
}

/// Global options every data command needs.
struct Env {
    user: Option<String>,
    db: Option<PathBuf>,
    config: Option<PathBuf>,
}

impl Env {
    fn config(&self) -> Result<AppConfig> {
        let config = match &self.config {
            Some(path) => load_config_from(path)?,
            None => load_config()?,
        };
        Ok(config)
    }

    fn db_path(&self, config: &AppConfig) -> Result<PathBuf> {
        match &self.db {
            Some(path) => Ok(path.clone()),
            None => Ok(config.storage.resolved_db_path()?),
        }
    }

    /// Library for commands that write.
    async fn library(&self) -> Result<Library> {
        self.open_library(false).await
    }

    /// Library for commands that only read.
    async fn reader(&self) -> Result<Library> {
        self.open_library(true).await
    }

    async fn open_library(&self, readonly: bool) -> Result<Library> {
        let user = self
            .user
            .as_deref()
            .ok_or_else(|| eyre!("no user given: pass --user or set PEBBLES_USER"))?;
        let config = self.config()?;
        let db_path = self.db_path(&config)?;
        let storage = open_storage(&db_path, readonly)
            .await
            .wrap_err_with(|| format!("failed to open database at {}", db_path.display()))?;
        Ok(Library::new(storage, user)?)
    }

    async fn provider(&self) -> Result<ProviderAdapter> {
        let config = self.config()?;
        let settings = ProviderSettings::from_config(&config)?;
        let spinner = Spinner::new(format!("Connecting to {}", settings.kind()));
        let adapter = ProviderAdapter::connect(&settings).await;
        spinner.finish();
        Ok(adapter?)
    }
}

/// Open the database. Read-only opens fall back to a normal open when the
/// file does not exist yet, so the schema gets created.
async fn open_storage(db_path: &Path, readonly: bool) -> pebbles_shared::Result<Storage> {
    if readonly && db_path.exists() {
        Storage::open_readonly(db_path).await
    } else {
        Storage::open(db_path).await
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_generate(
    env: &Env,
    topic: &str,
    context: &[String],
    folder: Option<&str>,
    json: bool,
) -> Result<()> {
    let library = env.library().await?;
    let adapter = env.provider().await?;

    info!(topic, context = context.len(), provider = %adapter.kind(), "generating pebble");

    let spinner = Spinner::new(format!("Generating \"{topic}\" with {}", adapter.model()));
    let result = library.generate(&adapter, topic, context, folder).await;
    spinner.finish();
    let pebble = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&pebble)?);
    } else {
        print_pebble(&pebble, None);
    }
    Ok(())
}

async fn cmd_rewrite(env: &Env, text: &str, mode: &str) -> Result<()> {
    let adapter = env.provider().await?;
    let mode = RewriteMode::parse_lenient(mode);

    let spinner = Spinner::new(format!("Rewriting ({mode})"));
    let result = adapter.rewrite(text, mode).await;
    spinner.finish();

    println!("{}", result?);
    Ok(())
}

/// What `list` shows.
enum ListScope {
    All,
    Trash,
    Folder(Option<String>),
    Search(String),
}

async fn cmd_list(env: &Env, scope: ListScope) -> Result<()> {
    let library = env.reader().await?;
    let listing = match &scope {
        ListScope::All => Listing {
            folders: Vec::new(),
            pebbles: library.list().await?,
        },
        ListScope::Trash => Listing {
            folders: Vec::new(),
            pebbles: library.trash().await?,
        },
        ListScope::Folder(folder) => library.list_in(folder.as_deref()).await?,
        ListScope::Search(term) => library.search(term).await?,
    };

    if listing.is_empty() {
        let message = match scope {
            ListScope::All => "No pebbles yet.",
            ListScope::Trash => "Trash is empty.",
            ListScope::Folder(_) => "This folder is empty.",
            ListScope::Search(_) => "Nothing matches.",
        };
        println!("{message}");
        return Ok(());
    }

    for f in &listing.folders {
        println!("{}  {}/", f.id, f.name);
    }
    for p in &listing.pebbles {
        println!(
            "{}  {}  {}{}{}",
            p.id,
            format_millis(p.timestamp),
            p.topic,
            if p.is_verified { "  ✓" } else { "" },
            p.folder_id
                .as_deref()
                .map(|f| format!("  [{f}]"))
                .unwrap_or_default(),
        );
    }
    Ok(())
}

async fn cmd_show(env: &Env, id: &str, level: Option<CognitiveLevel>, json: bool) -> Result<()> {
    let pebble = env.reader().await?.get(id).await?;
    if json {
        match level {
            Some(level) => println!("{}", serde_json::to_string_pretty(pebble.content.level(level))?),
            None => println!("{}", serde_json::to_string_pretty(&pebble)?),
        }
    } else {
        print_pebble(&pebble, level);
    }
    Ok(())
}

async fn cmd_delete_or_restore(env: &Env, ids: &[String], delete: bool) -> Result<()> {
    let library = env.library().await?;
    for id in ids {
        let pebble = if delete {
            library.delete(id).await?
        } else {
            library.restore(id).await?
        };
        println!(
            "{} \"{}\"",
            if delete { "Deleted" } else { "Restored" },
            pebble.topic
        );
    }
    Ok(())
}

async fn cmd_edit(
    env: &Env,
    id: &str,
    level: CognitiveLevel,
    target: &BlockTarget,
    heading: Option<String>,
    body: Option<String>,
) -> Result<()> {
    let (section, index) = target.resolve()?;
    let library = env.library().await?;
    let pebble = match section {
        BlockSection::Main => library.edit_main_block(id, level, index, heading, body).await?,
        BlockSection::Sidebar => {
            library
                .edit_sidebar_block(id, level, index, heading, body)
                .await?
        }
    };
    println!("Updated {level} {section} block {index}:");
    print_block(pebble.content.level(level), section, index);
    Ok(())
}

async fn cmd_rewrite_block(
    env: &Env,
    id: &str,
    level: CognitiveLevel,
    target: &BlockTarget,
    mode: &str,
) -> Result<()> {
    let (section, index) = target.resolve()?;
    let mode = RewriteMode::parse_lenient(mode);
    let library = env.library().await?;
    let adapter = env.provider().await?;

    let spinner = Spinner::new(format!("Rewriting {level} {section} block {index} ({mode})"));
    let result = library
        .rewrite_block(&adapter, id, level, section, index, mode)
        .await;
    spinner.finish();
    let pebble = result?;

    println!("Rewrote {level} {section} block {index}:");
    print_block(pebble.content.level(level), section, index);
    Ok(())
}

async fn cmd_folder(env: &Env, action: FolderAction) -> Result<()> {
    let library = match action {
        FolderAction::List => env.reader().await?,
        _ => env.library().await?,
    };
    match action {
        FolderAction::Create {
            name,
            parent,
            pebbles,
        } => {
            let folder = library
                .create_folder(&name, parent.as_deref(), &pebbles)
                .await?;
            println!("Created folder \"{}\" ({})", folder.name, folder.id);
            if !pebbles.is_empty() {
                println!("Moved {} pebble(s) into it", pebbles.len());
            }
        }
        FolderAction::List => {
            let folders = library.list_folders().await?;
            if folders.is_empty() {
                println!("No folders yet.");
            } else {
                print_folder_tree(&folders);
            }
        }
        FolderAction::Rename { id, name } => {
            let folder = library.rename_folder(&id, &name).await?;
            println!("Renamed folder {} to \"{}\"", folder.id, folder.name);
        }
        FolderAction::Move { id, parent } => {
            let folder = library.move_folder(&id, parent.as_deref()).await?;
            println!(
                "Moved folder \"{}\" to {}",
                folder.name,
                folder.parent_id.as_deref().unwrap_or("the root")
            );
        }
        FolderAction::Ungroup { id } => {
            let folder = library.ungroup_folder(&id).await?;
            println!(
                "Ungrouped \"{}\"; contents moved to {}",
                folder.name,
                folder.parent_id.as_deref().unwrap_or("the root")
            );
        }
    }
    Ok(())
}

fn cmd_config_init(force: bool) -> Result<()> {
    let path = config_file_path()?;
    if path.exists() && !force {
        return Err(eyre!(
            "config already exists at {} (use --force to overwrite)",
            path.display()
        ));
    }
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(env: &Env) -> Result<()> {
    let config = env.config()?;
    let db_path = env.db_path(&config)?;
    println!("# database: {}", db_path.display());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn format_millis(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn print_pebble(pebble: &Pebble, only: Option<CognitiveLevel>) {
    println!("{}  ({})", pebble.topic, pebble.id);
    println!(
        "  created {}{}{}",
        format_millis(pebble.timestamp),
        if pebble.is_verified { "  verified" } else { "" },
        if pebble.is_deleted { "  in trash" } else { "" },
    );
    if let Some(folder) = &pebble.folder_id {
        println!("  folder {folder}");
    }

    let levels: Vec<CognitiveLevel> = match only {
        Some(level) => vec![level],
        None => CognitiveLevel::ALL.to_vec(),
    };
    for level in levels {
        let content = pebble.content.level(level);
        println!();
        println!("{level}: {}", content.title);
        println!("  {}", content.summary);
        println!("  {}", content.emoji_collage.join(" "));
        for index in 0..content.main_content.len() {
            print_block(content, BlockSection::Main, index);
        }
        for index in 0..content.sidebar_content.len() {
            print_block(content, BlockSection::Sidebar, index);
        }
        if !content.keywords.is_empty() {
            println!("  keywords: {}", content.keywords.join(", "));
        }
    }

    if only.is_none() && !pebble.socratic_questions.is_empty() {
        println!();
        println!("Questions:");
        for (i, q) in pebble.socratic_questions.iter().enumerate() {
            println!("  {}. {q}", i + 1);
        }
    }
}

fn print_block(content: &LevelContent, section: BlockSection, index: usize) {
    let edited = |flag: bool| if flag { " (edited)" } else { "" };
    match section {
        BlockSection::Main => {
            let Some(block) = content.main_content.get(index) else {
                return;
            };
            println!(
                "  [main {index}] {} / {}{}{}",
                block.kind.as_str(),
                block.icon_type.as_str(),
                block
                    .heading
                    .as_deref()
                    .map(|h| format!(": {h}"))
                    .unwrap_or_default(),
                edited(block.is_user_edited),
            );
            match &block.body {
                MainBody::Text(text) => println!("      {text}"),
                MainBody::Points(points) => {
                    for point in points {
                        println!("      • {point}");
                    }
                }
            }
        }
        BlockSection::Sidebar => {
            let Some(block) = content.sidebar_content.get(index) else {
                return;
            };
            println!(
                "  [sidebar {index}] {} {}{}: {}{}",
                block.kind.as_str(),
                block.emoji.as_deref().unwrap_or(""),
                block.heading,
                block.body,
                edited(block.is_user_edited),
            );
        }
    }
}

fn print_folder_tree(folders: &[Folder]) {
    fn walk(folders: &[Folder], parent: Option<&str>, depth: usize, seen: &mut Vec<String>) {
        for folder in folders.iter().filter(|f| f.parent_id.as_deref() == parent) {
            // parentId cycles are possible; print each folder once.
            if seen.contains(&folder.id) {
                continue;
            }
            seen.push(folder.id.clone());
            println!("{}{}  ({})", "  ".repeat(depth), folder.name, folder.id);
            walk(folders, Some(folder.id.as_str()), depth + 1, seen);
        }
    }

    let mut seen = Vec::new();
    walk(folders, None, 0, &mut seen);

    // Folders whose parent is missing or part of a cycle.
    let orphans: Vec<&Folder> = folders.iter().filter(|f| !seen.contains(&f.id)).collect();
    for folder in orphans {
        println!(
            "{}  ({}, parent {})",
            folder.name,
            folder.id,
            folder.parent_id.as_deref().unwrap_or("?")
        );
    }
}

// ---------------------------------------------------------------------------
// Spinner
// ---------------------------------------------------------------------------

/// Indicatif spinner shown while waiting on the provider.
struct Spinner {
    bar: ProgressBar,
}

impl Spinner {
    fn new(message: String) -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            bar.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
        }
        bar.set_message(message);
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }

    fn finish(self) {
        self.bar.finish_and_clear();
    }
}
