//! Plain-text rendering of pages, feeds and batch results

use std::fmt::Write;

use crate::{
    app::{FeedKind, FeedView},
    bsky::{FollowItem, ListItem, ListMemberItem},
    lists::MembershipResult,
    paging::{PageView, Pagination},
};

const WRAP_WIDTH: usize = 80;

pub fn pagination(pagination: &Pagination) -> String {
    let more = if pagination.has_more_pages { "+" } else { "" };
    format!(
        "Page {} of {}{} ({} loaded)",
        pagination.current_page,
        pagination.total_pages.max(1),
        more,
        pagination.total_prefetched
    )
}

fn profile_line(out: &mut String, handle: &str, name: Option<&str>, did: &str) {
    match name.filter(|name| !name.is_empty()) {
        Some(name) => {
            let _ = writeln!(out, "  @{} ({})  {}", handle, name, did);
        }
        None => {
            let _ = writeln!(out, "  @{}  {}", handle, did);
        }
    }
}

pub fn follows(page: &PageView<FollowItem>) -> String {
    let mut out = String::new();
    for follow in &page.data {
        profile_line(&mut out, &follow.handle, follow.name.as_deref(), &follow.did);
    }
    if page.data.is_empty() {
        out.push_str("  You are not following anyone yet.\n");
    }
    out.push_str(&pagination(&page.pagination));
    out
}

/// Lists with their slug when one is known
pub fn lists<F>(page: &PageView<ListItem>, slug_for: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::new();
    for list in &page.data {
        let slug = slug_for(&list.uri).unwrap_or_default();
        let _ = writeln!(out, "  {} [{}]  {}", list.name, slug, list.uri);
        if let Some(description) = list.description.as_deref().filter(|d| !d.is_empty()) {
            let _ = writeln!(out, "      {}", description);
        }
    }
    if page.data.is_empty() {
        out.push_str("  No lists yet.\n");
    }
    out.push_str(&pagination(&page.pagination));
    out
}

pub fn members(page: &PageView<ListMemberItem>) -> String {
    let mut out = String::new();
    if let Some(info) = &page.list_info {
        let _ = writeln!(out, "{}", info.name);
        if let Some(description) = info.description.as_deref().filter(|d| !d.is_empty()) {
            let _ = writeln!(out, "{}", description);
        }
    }
    for member in &page.data {
        profile_line(&mut out, &member.handle, member.name.as_deref(), &member.did);
        let _ = writeln!(out, "      item: {}", member.uri);
    }
    if page.data.is_empty() {
        out.push_str("  This list has no members.\n");
    }
    out.push_str(&pagination(&page.pagination));
    out
}

pub fn feed(view: &FeedView) -> String {
    let mut out = String::new();
    let title = match view.kind {
        FeedKind::Timeline => "Timeline",
        FeedKind::ListPosts => "List feed",
    };
    let _ = writeln!(out, "{}", title);

    for post in &view.data {
        let author = match post.author.name.as_deref().filter(|name| !name.is_empty()) {
            Some(name) => format!("{} (@{})", name, post.author.handle),
            None => format!("@{}", post.author.handle),
        };
        let _ = writeln!(out, "\n{}  {}", author, post.indexed_at);
        for line in textwrap::wrap(&post.text, WRAP_WIDTH - 2) {
            let _ = writeln!(out, "  {}", line);
        }
    }
    if view.data.is_empty() {
        out.push_str("  Nothing to show.\n");
    }
    out
}

pub fn membership_results(results: &[MembershipResult]) -> String {
    let mut out = String::new();
    for result in results {
        let mark = if result.success { "ok" } else { "failed" };
        let target = match (&result.profile_did, &result.list_name, &result.item_uri) {
            (Some(did), Some(list), _) => format!("{} -> {}", did, list),
            (_, _, Some(item)) => item.clone(),
            _ => String::new(),
        };
        let _ = writeln!(out, "[{}] {}: {}", mark, target, result.message);
    }
    let succeeded = results.iter().filter(|result| result.success).count();
    let _ = write!(out, "{} of {} succeeded", succeeded, results.len());
    out
}
