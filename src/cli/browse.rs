//! Interactive pager over follows, lists and list members

use anyhow::Result;
use clap::{Args, ValueEnum};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use super::render;
use crate::{
    app::App,
    errors::BluelistResult,
    paging::{PageRequest, Pagination},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BrowseTarget {
    Follows,
    Lists,
    Members,
}

/// Page through a collection: Enter/n next, p previous, a number jumps, r refreshes, q quits
#[derive(Args)]
pub struct BrowseCommand {
    #[arg(value_enum)]
    pub target: BrowseTarget,

    /// List slug or URI, required for `members`
    pub list: Option<String>,
}

/// What the user asked for at the prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Navigation {
    Next,
    Previous,
    Jump(usize),
    Refresh,
    Quit,
}

fn parse_navigation(input: &str) -> Option<Navigation> {
    match input.trim() {
        "" | "n" => Some(Navigation::Next),
        "p" => Some(Navigation::Previous),
        "r" => Some(Navigation::Refresh),
        "q" => Some(Navigation::Quit),
        other => other.parse().ok().filter(|page| *page > 0).map(Navigation::Jump),
    }
}

impl BrowseCommand {
    pub async fn execute(&self, app: &App) -> Result<()> {
        let list_uri = match (self.target, &self.list) {
            (BrowseTarget::Members, Some(list)) => Some(app.resolve_list(list)?),
            (BrowseTarget::Members, None) => {
                return Err(anyhow::anyhow!("A list slug or URI is required to browse members"))
            }
            _ => None,
        };

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut request = PageRequest::page(1);

        loop {
            let (text, pagination) = self.load(app, list_uri.as_deref(), request).await?;
            println!("{}", text);
            print!("[n]ext [p]rev [r]efresh [q]uit or page number > ");
            std::io::stdout().flush()?;

            let prefetch = async {
                if pagination.has_more_pages {
                    let next = PageRequest::prefetch(pagination.current_page + 1);
                    if let Err(e) = self.load(app, list_uri.as_deref(), next).await {
                        debug!("Prefetch failed: {}", e);
                    }
                }
            };
            let (line, ()) = tokio::join!(lines.next_line(), prefetch);

            let Some(line) = line? else {
                return Ok(());
            };
            let current = pagination.current_page;
            request = match parse_navigation(&line) {
                Some(Navigation::Next) => PageRequest::page(current + 1),
                Some(Navigation::Previous) => PageRequest::page(current.saturating_sub(1).max(1)),
                Some(Navigation::Jump(page)) => PageRequest::page(page),
                Some(Navigation::Refresh) => PageRequest::refresh(),
                Some(Navigation::Quit) => return Ok(()),
                None => {
                    println!("Unknown input: {}", line.trim());
                    PageRequest::page(current)
                }
            };
        }
    }

    async fn load(
        &self,
        app: &App,
        list_uri: Option<&str>,
        request: PageRequest,
    ) -> BluelistResult<(String, Pagination)> {
        match (self.target, list_uri) {
            (BrowseTarget::Members, Some(list_uri)) => {
                let page = app.get_list_members(list_uri, request).await?.display_data;
                Ok((render::members(&page), page.pagination))
            }
            (BrowseTarget::Lists, _) => {
                let page = app.get_lists(request).await?.display_data;
                Ok((render::lists(&page, |uri| app.slug_for(uri)), page.pagination))
            }
            _ => {
                let page = app.get_follows(request).await?.display_data;
                Ok((render::follows(&page), page.pagination))
            }
        }
    }
}
