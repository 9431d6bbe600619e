//! Markdown reference rewriting.
//!
//! Imported pages move from a folder tree into the wiki, so relative links
//! between pages and references to attachments have to be pointed at their
//! new homes. Only `[title](target)` and `![title](target)` tokens are
//! touched; every other byte of the document is copied through unchanged.
//!
//! Rewriting never fails. A reference that cannot be resolved is left as it
//! was, and every rewritten target is either absolute or contains a path
//! separator, so running the rewriter over its own output changes nothing.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::candidate::ImportCandidate;
use crate::config::ImportConfig;

pub mod index;

pub use index::{normalize_key, FileIndex, PageIndex};

/// Link or image token with optional tooltip and size suffix.
static RE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?P<image>!?)\[(?P<title>[^\]\n]*)\]\((?P<target>[^\s()]+)(?P<tooltip>\s+(?:"(?:[^"\\\n]|\\.)*"|'(?:[^'\\\n]|\\.)*'))?(?P<size>\s*=[^\s()]*)?\s*\)"#,
    )
    .unwrap()
});

static RE_SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:").unwrap());

/// Rewrites the references of one project's imported pages.
#[derive(Debug, Clone, Copy)]
pub struct Rewriter<'a> {
    project_id: &'a str,
    pages: &'a PageIndex,
    files: &'a FileIndex,
    config: &'a ImportConfig,
}

impl<'a> Rewriter<'a> {
    pub fn new(
        project_id: &'a str,
        pages: &'a PageIndex,
        files: &'a FileIndex,
        config: &'a ImportConfig,
    ) -> Self {
        Self {
            project_id,
            pages,
            files,
            config,
        }
    }

    /// Returns `content` with every resolvable reference rewritten.
    ///
    /// `candidate` supplies the folder used to qualify attachment lookups.
    pub fn rewrite_content(&self, candidate: &ImportCandidate, content: &str) -> String {
        RE_TOKEN
            .replace_all(content, |caps: &Captures| self.rewrite_token(candidate, caps))
            .into_owned()
    }

    fn rewrite_token(&self, candidate: &ImportCandidate, caps: &Captures) -> String {
        let (Some(whole), Some(target)) = (caps.get(0), caps.name("target")) else {
            return String::new();
        };
        let is_image = is_image(caps);
        if !size_allows_rewrite(caps) {
            return whole.as_str().to_string();
        }

        match self.resolve_target(candidate, target.as_str(), is_image) {
            Some(replacement) => {
                let token = whole.as_str();
                let start = target.start() - whole.start();
                let end = target.end() - whole.start();
                tracing::trace!(
                    page = %candidate.wiki_name,
                    from = target.as_str(),
                    to = %replacement,
                    "Rewrote reference"
                );
                format!("{}{}{}", &token[..start], replacement, &token[end..])
            }
            None => whole.as_str().to_string(),
        }
    }

    fn resolve_target(
        &self,
        candidate: &ImportCandidate,
        target: &str,
        is_image: bool,
    ) -> Option<String> {
        let name = page_name(target)?;

        if let Some((_, fragment)) = target.split_once('#') {
            let wiki_name = self.pages.resolve(name)?;
            return Some(format!("{}#{}", page_link(wiki_name), fragment));
        }

        if let Some(wiki_name) = self.pages.resolve(name) {
            return Some(page_link(wiki_name));
        }

        let file_id = self.files.resolve(&candidate.original_name, target)?;
        Some(self.config.file_url(self.project_id, file_id, is_image))
    }
}

/// Page names the rewritable tokens of `content` refer to, in order.
///
/// Absolute URLs, relative paths and links carrying a size suffix are
/// skipped since they are never resolved against pages.
pub fn page_references(content: &str) -> Vec<&str> {
    RE_TOKEN
        .captures_iter(content)
        .filter(|caps| size_allows_rewrite(caps))
        .filter_map(|caps| caps.name("target"))
        .filter_map(|target| page_name(target.as_str()))
        .collect()
}

/// The page name part of `target`, if it can name a page at all.
fn page_name(target: &str) -> Option<&str> {
    if is_absolute_url(target) || has_path_separator(target) {
        return None;
    }
    let name = target.split_once('#').map_or(target, |(name, _)| name);
    (!name.is_empty()).then_some(name)
}

fn is_image(caps: &Captures) -> bool {
    caps.name("image").is_some_and(|m| !m.as_str().is_empty())
}

/// Links never carry a size; images only a numeric one.
fn size_allows_rewrite(caps: &Captures) -> bool {
    match caps.name("size") {
        None => true,
        Some(size) => is_image(caps) && is_numeric_size(size.as_str()),
    }
}

fn page_link(wiki_name: &str) -> String {
    format!("../{}/", urlencoding::encode(wiki_name))
}

fn is_absolute_url(target: &str) -> bool {
    target.starts_with("//") || RE_SCHEME.is_match(target)
}

fn has_path_separator(target: &str) -> bool {
    target.contains(['/', '\\']) || normalize_key(target).contains(['/', '\\'])
}

/// `=N` with at least one ASCII digit and nothing else.
fn is_numeric_size(suffix: &str) -> bool {
    suffix
        .trim_start()
        .strip_prefix('=')
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}
