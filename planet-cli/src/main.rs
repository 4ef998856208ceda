//! planet: author, publish and follow decentralized sites.
//!
//! # Usage
//!
//! ```bash
//! # Create a planet and write the first article
//! planet create "My Notes" --about "Things I learned"
//! planet draft new <planet>
//! planet draft set <planet> --draft <draft> --title "Hello" --content-file hello.md
//! planet draft attach <planet> --draft <draft> photo.png
//! planet draft commit <planet> --draft <draft>
//! planet publish <planet>
//!
//! # Follow someone else
//! planet follow k51qzi5uqu5d...
//! planet update --all
//!
//! # Keep the daemon running in the foreground
//! planet daemon
//! ```

mod config;
mod node;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use config::AppConfig;
use node::{LocalApi, Node};
use planet_core::{
    DraftRef, MyPlanetHandle, PlanetStore, Publisher, RootLayout, SubscriptionSync, UpdateOutcome,
};
use planet_ipfs::{ControlServer, NodeSupervisor, PowerMonitor};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "planet")]
#[command(author = "Planet Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Decentralized blogging on IPFS")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "planet.toml")]
    config: PathBuf,

    /// Data directory (overrides the configuration file)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the IPFS daemon in the foreground until interrupted
    Daemon,

    /// Create a planet
    Create {
        name: String,
        #[arg(long, default_value = "")]
        about: String,
    },

    /// List owned and followed planets
    List,

    /// Delete an owned planet, or one of its articles
    Delete {
        planet: Uuid,
        /// Delete only this article
        #[arg(long)]
        article: Option<Uuid>,
        /// Also remove the article's published files
        #[arg(long, requires = "article")]
        purge: bool,
    },

    /// Work with drafts
    #[command(subcommand)]
    Draft(DraftCommand),

    /// Publish an owned planet
    Publish { planet: Uuid },

    /// Follow a planet by its IPNS name
    Follow { link: String },

    /// Stop following a planet
    Unfollow { planet: Uuid },

    /// Fetch new articles from followed planets
    Update {
        planet: Option<Uuid>,
        #[arg(long, conflicts_with = "planet")]
        all: bool,
    },

    /// Star or unstar an article
    Star {
        planet: Uuid,
        article: Uuid,
        #[arg(long)]
        off: bool,
    },

    /// Mark an article of a followed planet read or unread
    Read {
        planet: Uuid,
        article: Uuid,
        #[arg(long)]
        unread: bool,
    },

    /// Back up or restore a planet's signing key
    #[command(subcommand)]
    Key(KeyCommand),

    /// Print the CID a file would get, without adding it
    Cid { file: PathBuf },
}

#[derive(Args, Debug, Clone, Copy)]
#[group(required = true, multiple = false)]
struct DraftTarget {
    /// New-article draft id
    #[arg(long)]
    draft: Option<Uuid>,
    /// Article whose edit draft to use
    #[arg(long)]
    article: Option<Uuid>,
}

impl DraftTarget {
    fn draft_ref(self) -> Result<DraftRef> {
        match (self.draft, self.article) {
            (Some(id), None) => Ok(DraftRef::New(id)),
            (None, Some(id)) => Ok(DraftRef::Edit(id)),
            _ => Err(anyhow!("Specify exactly one of --draft or --article")),
        }
    }
}

#[derive(Subcommand, Debug)]
enum DraftCommand {
    /// Start a new article
    New { planet: Uuid },
    /// Start (or resume) editing an article
    Edit { planet: Uuid, article: Uuid },
    /// Set the title and/or content
    Set {
        planet: Uuid,
        #[command(flatten)]
        target: DraftTarget,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, conflicts_with = "content_file")]
        content: Option<String>,
        #[arg(long)]
        content_file: Option<PathBuf>,
    },
    /// Add or replace an attachment
    Attach {
        planet: Uuid,
        #[command(flatten)]
        target: DraftTarget,
        file: PathBuf,
    },
    /// Remove an attachment
    Detach {
        planet: Uuid,
        #[command(flatten)]
        target: DraftTarget,
        name: String,
    },
    /// Undo a pending replace or removal
    Revert {
        planet: Uuid,
        #[command(flatten)]
        target: DraftTarget,
        name: String,
    },
    /// Render the draft to preview.html
    Preview {
        planet: Uuid,
        #[command(flatten)]
        target: DraftTarget,
    },
    /// Turn the draft into an article
    Commit {
        planet: Uuid,
        #[command(flatten)]
        target: DraftTarget,
    },
    /// Throw the draft away
    Discard {
        planet: Uuid,
        #[command(flatten)]
        target: DraftTarget,
    },
}

#[derive(Subcommand, Debug)]
enum KeyCommand {
    /// Write the planet's key to a file
    Export { planet: Uuid, output: PathBuf },
    /// Import a key file for a planet
    Import { planet: Uuid, input: PathBuf },
}

fn init_tracing(debug: bool) {
    let env_filter = if debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("planet=info"))
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let mut config = AppConfig::load(&cli.config)?;
    if let Some(root) = cli.root {
        config.root = root;
    }
    let config = config.resolve();
    std::fs::create_dir_all(&config.root)
        .with_context(|| format!("Failed to create {}", config.root.display()))?;

    let supervisor = Node::prepare(&config).await?;
    let store = Arc::new(
        PlanetStore::open(RootLayout::new(&config.root))
            .await
            .context("Failed to load planets")?,
    );

    match cli.command {
        Commands::Daemon => run_daemon(&config, supervisor).await,
        Commands::Create { name, about } => {
            let node = Node::start(supervisor.clone()).await?;
            let result = store.create_my_planet(node.client.as_ref(), &name, &about).await;
            node.stop().await;
            let handle = result?;
            println!("{}", handle.id());
            Ok(())
        }
        Commands::List => list(&store).await,
        Commands::Delete {
            planet,
            article: Some(article),
            purge,
        } => {
            let handle = store.my_planet(planet).await?;
            handle.delete_article(article, purge).await?;
            info!("Deleted article {}", article);
            Ok(())
        }
        Commands::Delete { planet, article: None, .. } => {
            let node = Node::start(supervisor.clone()).await?;
            let result = store.delete_my_planet(node.client.as_ref(), planet).await;
            node.stop().await;
            Ok(result?)
        }
        Commands::Draft(cmd) => draft(&store, cmd).await,
        Commands::Publish { planet } => {
            let handle = store.my_planet(planet).await?;
            let node = Node::start(supervisor.clone()).await?;
            let result = Publisher::new(node.client.clone()).publish(&handle).await;
            node.stop().await;
            let outcome = result?;
            println!("{}", outcome.cid());
            Ok(())
        }
        Commands::Follow { link } => {
            let node = Node::start(supervisor.clone()).await?;
            let sync = SubscriptionSync::new(node.client.clone(), store.clone());
            let result = sync.follow(&link).await;
            node.stop().await;
            let handle = result?;
            println!("{}", handle.id());
            Ok(())
        }
        Commands::Unfollow { planet } => Ok(store.unfollow(planet).await?),
        Commands::Update { planet, all } => {
            let node = Node::start(supervisor.clone()).await?;
            let sync = SubscriptionSync::new(node.client.clone(), store.clone());
            let result = match planet {
                Some(id) => update_one(&store, &sync, id).await,
                None if all => {
                    let updated = sync.update_all().await;
                    println!("{} planet(s) updated", updated);
                    Ok(())
                }
                None => Err(anyhow!("Specify a planet or --all")),
            };
            node.stop().await;
            result
        }
        Commands::Star { planet, article, off } => {
            if let Ok(handle) = store.my_planet(planet).await {
                return Ok(handle.set_starred(article, !off).await?);
            }
            let handle = store.following_planet(planet).await?;
            Ok(handle.set_starred(article, !off).await?)
        }
        Commands::Read { planet, article, unread } => {
            let handle = store.following_planet(planet).await?;
            Ok(handle.set_read(article, !unread).await?)
        }
        Commands::Key(cmd) => {
            let node = Node::start(supervisor.clone()).await?;
            let result = key(&store, &node, cmd).await;
            node.stop().await;
            result
        }
        Commands::Cid { file } => {
            let node = Node::start(supervisor.clone()).await?;
            let result = node.client.file_cid(&file).await;
            node.stop().await;
            println!("{}", result?);
            Ok(())
        }
    }
}

async fn run_daemon(config: &AppConfig, supervisor: Arc<NodeSupervisor>) -> Result<()> {
    let node = Node::start(supervisor).await?;
    let api = Arc::new(LocalApi::default());
    if config.api_enabled {
        api.start().await?;
    }
    let power = PowerMonitor::new(api.clone(), config.api_enabled, config.node.wake_delay());
    info!("Daemon running, press Ctrl-C to stop");

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        // SIGUSR1/SIGUSR2 stand in for system sleep/wake notifications.
        let mut sleep = signal(SignalKind::user_defined1())?;
        let mut wake = signal(SignalKind::user_defined2())?;
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                _ = sleep.recv() => power.on_sleep().await,
                _ = wake.recv() => {
                    let _ = power.on_wake();
                }
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = &power;
        tokio::signal::ctrl_c().await?;
    }

    info!("Shutting down (control server serving: {})", api.is_serving());
    node.stop().await;
    Ok(())
}

async fn list(store: &PlanetStore) -> Result<()> {
    for handle in store.my_planets().await {
        let planet = handle.planet().read().await;
        println!(
            "{}  {}  [{} articles, {} drafts]  {}",
            planet.id,
            planet.name,
            planet.articles.len(),
            planet.drafts.len(),
            planet.last_published_cid.as_deref().unwrap_or("unpublished")
        );
        for article in &planet.articles {
            let star = if article.starred.is_some() { "*" } else { " " };
            println!("  {} {}  {}", star, article.id, article.title);
        }
    }
    for handle in store.following_planets().await {
        let planet = handle.planet().read().await;
        println!(
            "{}  {}  (following {}, {} unread)",
            planet.id,
            planet.name,
            planet.link,
            planet.unread_count()
        );
        for article in &planet.articles {
            let mark = if article.read.is_none() { "+" } else { " " };
            println!("  {} {}  {}", mark, article.id, article.title);
        }
    }
    Ok(())
}

async fn draft(store: &PlanetStore, cmd: DraftCommand) -> Result<()> {
    match cmd {
        DraftCommand::New { planet } => {
            let id = store.my_planet(planet).await?.new_draft().await?;
            println!("{}", id);
        }
        DraftCommand::Edit { planet, article } => {
            store.my_planet(planet).await?.edit_article(article).await?;
            println!("{}", article);
        }
        DraftCommand::Set {
            planet,
            target,
            title,
            content,
            content_file,
        } => {
            let content = match content_file {
                Some(path) => Some(
                    std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))?,
                ),
                None => content,
            };
            if title.is_none() && content.is_none() {
                bail!("Nothing to set: pass --title, --content or --content-file");
            }
            with_draft(store, planet, target, |d| {
                if let Some(title) = title {
                    d.title = title;
                }
                if let Some(content) = content {
                    d.content = content;
                }
                Ok(())
            })
            .await?;
        }
        DraftCommand::Attach { planet, target, file } => {
            let snippet = with_draft(store, planet, target, |d| {
                let attachment = d.add_attachment(&file)?;
                Ok(attachment.markdown())
            })
            .await?;
            if let Some(snippet) = snippet {
                println!("{}", snippet);
            }
        }
        DraftCommand::Detach { planet, target, name } => {
            let removed = with_draft(store, planet, target, |d| Ok(d.delete_attachment(&name))).await?;
            if !removed {
                bail!("No attachment named {}", name);
            }
        }
        DraftCommand::Revert { planet, target, name } => {
            let reverted = with_draft(store, planet, target, |d| Ok(d.revert_attachment(&name))).await?;
            if !reverted {
                bail!("Attachment {} has no pending change to revert", name);
            }
        }
        DraftCommand::Preview { planet, target } => {
            let path = with_draft(store, planet, target, |d| d.render_preview()).await?;
            println!("{}", path.display());
        }
        DraftCommand::Commit { planet, target } => {
            let id = store
                .my_planet(planet)
                .await?
                .commit_draft(target.draft_ref()?)
                .await?;
            println!("{}", id);
        }
        DraftCommand::Discard { planet, target } => {
            store
                .my_planet(planet)
                .await?
                .discard_draft(target.draft_ref()?)
                .await?;
        }
    }
    Ok(())
}

async fn with_draft<T>(
    store: &PlanetStore,
    planet: Uuid,
    target: DraftTarget,
    f: impl FnOnce(&mut planet_core::Draft) -> planet_core::Result<T>,
) -> Result<T> {
    let handle: Arc<MyPlanetHandle> = store.my_planet(planet).await?;
    Ok(handle.update_draft(target.draft_ref()?, f).await?)
}

async fn update_one(store: &PlanetStore, sync: &SubscriptionSync, id: Uuid) -> Result<()> {
    let handle = store.following_planet(id).await?;
    match sync.update(&handle).await? {
        UpdateOutcome::Unchanged { cid } => println!("Up to date at {}", cid),
        UpdateOutcome::Updated { cid, added, refreshed } => {
            println!("Updated to {}: {} new, {} changed", cid, added, refreshed)
        }
    }
    Ok(())
}

async fn key(store: &PlanetStore, node: &Node, cmd: KeyCommand) -> Result<()> {
    match cmd {
        KeyCommand::Export { planet, output } => {
            let key_name = store.my_planet(planet).await?.planet().read().await.key_name();
            node.client.export_key(&key_name, &output).await?;
            println!("{}", output.display());
        }
        KeyCommand::Import { planet, input } => {
            let handle = store.my_planet(planet).await?;
            let key_name = handle.planet().read().await.key_name();
            let id = node.client.import_key(&key_name, &input).await?;
            let ipns = handle.planet().read().await.ipns.clone();
            if !ipns.is_empty() && ipns != id {
                tracing::warn!("imported key {} does not match planet name {}", id, ipns);
            }
            println!("{}", id);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_draft_target_requires_one() {
        let id = Uuid::new_v4();
        let parsed = Cli::try_parse_from([
            "planet",
            "draft",
            "commit",
            &id.to_string(),
            "--draft",
            &id.to_string(),
        ])
        .unwrap();
        match parsed.command {
            Commands::Draft(DraftCommand::Commit { target, .. }) => {
                assert_eq!(target.draft_ref().unwrap(), DraftRef::New(id));
            }
            other => panic!("unexpected command: {:?}", other),
        }

        assert!(Cli::try_parse_from(["planet", "draft", "commit", &id.to_string()]).is_err());
    }

    #[test]
    fn test_update_all_conflicts_with_planet() {
        let id = Uuid::new_v4().to_string();
        assert!(Cli::try_parse_from(["planet", "update", &id, "--all"]).is_err());
        assert!(Cli::try_parse_from(["planet", "update", "--all"]).is_ok());
    }
}
