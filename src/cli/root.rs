use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use std::{
    io::{self, Write},
    path::PathBuf,
};
use tracing::{debug, info};

use super::{
    browse::BrowseCommand,
    render,
};
use crate::{
    app::{App, DEFAULT_FEED_LIMIT},
    config::Config,
    lists::{ListRef, UserLists},
    paging::PageRequest,
};

/// Sort the profiles you follow on Bluesky into curated lists
#[derive(Parser)]
#[command(
    name = "bluelist",
    version,
    about = "Sort the profiles you follow on Bluesky into curated lists",
    long_about = r#"Bluelist pages through your follows, your lists and their members, manages
list membership, and can ask a language model how your follows fit your lists.

Examples:
  bluelist login alice.bsky.social        # Log in with an app password
  bluelist follows --page 2               # Second page of your follows
  bluelist browse members friends         # Page through a list by slug
  bluelist add did:plc:abc123 friends     # Add a profile to a list"#
)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short = 'd', long = "debug", global = true)]
    pub debug: bool,

    /// Directory for the session, slugs and request counts
    #[arg(long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Paging flags shared by the collection commands
#[derive(Args, Debug, Clone)]
pub struct PageArgs {
    /// Page to show (1-based)
    #[arg(short, long, default_value_t = 1)]
    pub page: usize,

    /// Print the page as JSON
    #[arg(long)]
    pub json: bool,
}

impl PageArgs {
    fn request(&self) -> PageRequest {
        PageRequest::page(self.page)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in with a handle (or email) and an app password
    Login {
        identifier: Option<String>,

        #[arg(long)]
        password: Option<String>,
    },

    /// Forget the saved session
    Logout,

    /// Show the logged-in account
    Whoami,

    /// Show a page of the accounts you follow
    Follows(PageArgs),

    /// Show a page of your lists
    Lists(PageArgs),

    /// Show a page of a list's members
    Members {
        /// List slug or URI
        list: String,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Page through follows, lists or members interactively
    Browse(BrowseCommand),

    /// Add a profile to one or more lists
    Add {
        did: String,

        /// List slugs or URIs
        #[arg(required = true)]
        lists: Vec<String>,
    },

    /// Remove list items by their item URI
    Remove {
        #[arg(required = true)]
        item_uris: Vec<String>,
    },

    /// Create a curated list
    CreateList {
        name: String,

        #[arg(long, default_value = "")]
        description: String,
    },

    /// Rename a list or change its description
    UpdateList {
        list: String,

        name: String,

        #[arg(long, default_value = "")]
        description: String,
    },

    /// Delete a list
    DeleteList { list: String },

    /// Show your home timeline
    Timeline {
        #[arg(long, default_value_t = DEFAULT_FEED_LIMIT)]
        limit: usize,

        #[arg(long)]
        json: bool,
    },

    /// Show recent posts from a list's members
    ListFeed {
        list: String,

        #[arg(long, default_value_t = DEFAULT_FEED_LIMIT)]
        limit: usize,

        #[arg(long)]
        json: bool,
    },

    /// Ask the language model how a page of your follows fits your lists
    Suggest {
        #[arg(short, long, default_value_t = 1)]
        page: usize,
    },
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        if self.debug {
            debug!("Debug logging enabled");
        }

        let config = Config::init(self.data_dir.clone()).await?;
        debug!("Configuration initialized, data in {}", config.data_dir.display());

        let app = App::new(config).await?;
        self.command.execute(&app).await
    }
}

impl Commands {
    async fn execute(self, app: &App) -> Result<()> {
        match self {
            Commands::Login { identifier, password } => {
                let identifier = identifier
                    .or_else(|| app.config().identifier.clone())
                    .ok_or_else(|| anyhow!("No identifier given. Pass one or set BLUELIST_IDENTIFIER."))?;
                let password = match password.or_else(|| app.config().app_password.clone()) {
                    Some(password) => password,
                    None => prompt("App password: ")?,
                };

                let session = app.login(&identifier, &password).await?;
                println!("Logged in as @{} ({})", session.handle, session.did);
            }
            Commands::Logout => {
                app.logout().await?;
                println!("Logged out");
            }
            Commands::Whoami => match app.auth().session() {
                Some(session) => {
                    println!("@{} ({})", session.handle, session.did);
                    if let Some(remaining) = app.remaining_suggestions() {
                        println!("{} suggestion requests left today", remaining);
                    }
                }
                None => println!("Not logged in"),
            },
            Commands::Follows(args) => {
                let result = app.get_follows(args.request()).await?;
                if args.json {
                    println!("{}", result.json);
                } else {
                    println!("{}", render::follows(&result.display_data));
                }
            }
            Commands::Lists(args) => {
                let result = app.get_lists(args.request()).await?;
                if args.json {
                    println!("{}", result.json);
                } else {
                    println!("{}", render::lists(&result.display_data, |uri| app.slug_for(uri)));
                }
            }
            Commands::Members { list, page } => {
                let list_uri = resolve_list(app, &list).await?;
                let result = app.get_list_members(&list_uri, page.request()).await?;
                if page.json {
                    println!("{}", result.json);
                } else {
                    println!("{}", render::members(&result.display_data));
                }
            }
            Commands::Browse(browse) => browse.execute(app).await?,
            Commands::Add { did, lists } => {
                let mut refs = Vec::with_capacity(lists.len());
                for list in &lists {
                    let uri = resolve_list(app, list).await?;
                    refs.push(ListRef {
                        uri,
                        name: list.clone(),
                    });
                }

                if let [single] = refs.as_slice() {
                    println!("{}", app.add_user_to_list(&did, &single.uri).await?);
                } else {
                    let batch = [UserLists {
                        profile_did: did,
                        lists: refs,
                    }];
                    let results = app.add_users_to_lists(&batch).await?;
                    println!("{}", render::membership_results(&results));
                }
            }
            Commands::Remove { item_uris } => {
                if let [single] = item_uris.as_slice() {
                    println!("{}", app.remove_user_from_list(single).await?);
                } else {
                    let results = app.remove_users_from_list(&item_uris).await?;
                    println!("{}", render::membership_results(&results));
                }
            }
            Commands::CreateList { name, description } => {
                let change = app.create_list(&name, &description).await?;
                println!("{}", change.message);
                if let Some(uri) = &change.uri {
                    let slug = app.slug_for(uri).unwrap_or_default();
                    println!("{} [{}]", uri, slug);
                }
            }
            Commands::UpdateList { list, name, description } => {
                let uri = resolve_list(app, &list).await?;
                println!("{}", app.update_list(&uri, &name, &description).await?.message);
            }
            Commands::DeleteList { list } => {
                let uri = resolve_list(app, &list).await?;
                println!("{}", app.delete_list(&uri).await?.message);
            }
            Commands::Timeline { limit, json } => {
                let view = app.timeline(limit).await?;
                if json {
                    println!("{}", serde_json::to_string(&view)?);
                } else {
                    println!("{}", render::feed(&view));
                }
            }
            Commands::ListFeed { list, limit, json } => {
                let uri = resolve_list(app, &list).await?;
                let view = app.list_feed(&uri, limit).await?;
                if json {
                    println!("{}", serde_json::to_string(&view)?);
                } else {
                    println!("{}", render::feed(&view));
                }
            }
            Commands::Suggest { page } => {
                info!("Requesting suggestions for follows page {}", page);
                let suggestion = app.suggest(page).await?;
                println!("{}", suggestion.content);
                println!("\n{} suggestion requests left today", suggestion.remaining);
            }
        }

        Ok(())
    }
}

/// Resolve a slug, loading the lists once when the slug is not known yet
async fn resolve_list(app: &App, input: &str) -> Result<String> {
    if let Ok(uri) = app.resolve_list(input) {
        return Ok(uri);
    }
    debug!("Unknown slug {}, loading lists", input);
    app.get_lists(PageRequest::page(1)).await?;
    Ok(app.resolve_list(input)?)
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
