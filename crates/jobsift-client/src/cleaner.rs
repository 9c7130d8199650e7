use std::sync::Arc;

use htmd::HtmlToMarkdown;
use jobsift_core::board::BoardType;
use jobsift_core::error::AppError;
use jobsift_core::traits::Cleaner;
use scraper::{Html, Selector};

/// Default output cap, in estimated tokens (4 characters each).
pub const DEFAULT_TOKEN_CAP: usize = 12_000;

/// Board-aware HTML-to-Markdown cleaner using htmd.
///
/// [`Cleaner::clean_for`] first narrows the document to the board's main
/// posting container when one is known and present, then converts and caps
/// the Markdown to the character budget.
#[derive(Clone)]
pub struct BoardCleaner {
    converter: Arc<HtmlToMarkdown>,
    max_chars: usize,
}

impl BoardCleaner {
    pub fn new() -> Self {
        let converter = HtmlToMarkdown::builder()
            .skip_tags(vec![
                "script", "style", "nav", "footer", "header", "aside", "noscript", "iframe", "svg",
                "form", "button",
            ])
            .build();

        Self {
            converter: Arc::new(converter),
            max_chars: DEFAULT_TOKEN_CAP * 4,
        }
    }

    pub fn with_token_cap(mut self, tokens: usize) -> Self {
        self.max_chars = tokens.saturating_mul(4);
        self
    }

    fn convert(&self, html: &str) -> Result<String, AppError> {
        let markdown = self
            .converter
            .convert(html)
            .map_err(|e| AppError::CleanerError(e.to_string()))?;
        Ok(cap_chars(collapse_blank_lines(&markdown), self.max_chars))
    }
}

impl Default for BoardCleaner {
    fn default() -> Self {
        Self::new()
    }
}

impl Cleaner for BoardCleaner {
    fn clean(&self, html: &str) -> Result<String, AppError> {
        self.convert(html)
    }

    fn clean_for(&self, html: &str, board: BoardType) -> Result<String, AppError> {
        match content_root(html, board) {
            Some(fragment) => self.convert(&fragment),
            None => self.convert(html),
        }
    }
}

/// CSS selectors of the posting container, most specific first.
fn root_selectors(board: BoardType) -> &'static [&'static str] {
    match board {
        BoardType::Greenhouse => &["#content", "#app_body", ".job-post"],
        BoardType::Lever => &[".posting-page", ".content"],
        BoardType::Ashby => &["[class*='_jobPosting']", "main"],
        BoardType::Workable => &["[data-ui='job-description']", "main"],
        BoardType::SmartRecruiters => &[".job-sections", "main"],
        BoardType::Workday => &["[data-automation-id='jobPostingDescription']"],
        BoardType::BambooHr => &[".BambooHR-ATS-board", "main"],
        BoardType::Recruitee => &[".job-description", "main"],
        BoardType::LinkedIn => &[".description__text", ".show-more-less-html"],
        BoardType::Indeed => &["#jobDescriptionText"],
        BoardType::Unknown => &[],
    }
}

/// Outer HTML of the first matching, non-empty content root.
fn content_root(html: &str, board: BoardType) -> Option<String> {
    let selectors = root_selectors(board);
    if selectors.is_empty() {
        return None;
    }
    let document = Html::parse_document(html);
    selectors
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|selector| {
            document
                .select(&selector)
                .find(|el| el.text().any(|t| !t.trim().is_empty()))
                .map(|el| el.html())
        })
}

fn collapse_blank_lines(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());
    let mut blank_run = 0;
    for line in markdown.trim().lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out.truncate(out.trim_end().len());
    out
}

fn cap_chars(mut s: String, max_chars: usize) -> String {
    if let Some((idx, _)) = s.char_indices().nth(max_chars) {
        s.truncate(idx);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    const GREENHOUSE_PAGE: &str = r#"
        <html><body>
          <nav>Jobs at Acme</nav>
          <div class="sidebar">Other openings: Sales Lead</div>
          <div id="content"><h1>Rust Engineer</h1><p>Build the ingestion pipeline.</p></div>
        </body></html>"#;

    #[test]
    fn converts_html_to_markdown() {
        let md = BoardCleaner::new().clean("<h1>Hello</h1><p>World</p>").unwrap();
        assert!(md.contains("Hello"));
        assert!(md.contains("World"));
    }

    #[test]
    fn strips_scripts() {
        let md = BoardCleaner::new()
            .clean("<p>Content</p><script>alert('xss')</script>")
            .unwrap();
        assert!(md.contains("Content"));
        assert!(!md.contains("alert"));
    }

    #[test]
    fn narrows_to_board_content_root() {
        let md = BoardCleaner::new()
            .clean_for(GREENHOUSE_PAGE, BoardType::Greenhouse)
            .unwrap();
        assert!(md.contains("Rust Engineer"));
        assert!(!md.contains("Sales Lead"));
    }

    #[test]
    fn falls_back_to_whole_page_without_root() {
        let md = BoardCleaner::new()
            .clean_for("<p>Only a paragraph</p>", BoardType::Lever)
            .unwrap();
        assert!(md.contains("Only a paragraph"));

        let md = BoardCleaner::new()
            .clean_for(GREENHOUSE_PAGE, BoardType::Unknown)
            .unwrap();
        assert!(md.contains("Sales Lead"));
    }

    #[test]
    fn output_is_capped_by_token_budget() {
        let html = format!("<p>{}</p>", "word ".repeat(500));
        let md = BoardCleaner::new().with_token_cap(10).clean(&html).unwrap();
        assert_eq!(md.chars().count(), 40);
    }

    #[test]
    fn blank_line_runs_collapse() {
        assert_eq!(collapse_blank_lines("a\n\n\n\nb\n"), "a\n\nb");
    }
}
