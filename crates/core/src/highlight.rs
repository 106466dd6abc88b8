//! Class-based syntax highlighting for fenced code blocks.

use once_cell::sync::Lazy;
use syntect::html::{ClassStyle, ClassedHTMLGenerator};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

static SYNTAX_SET: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);

/// Renders `code` as classed `<span>` markup for the given language token.
/// Returns `None` when the token names no known syntax, leaving the caller to
/// fall back to plain escaped text.
pub fn classed_html(code: &str, token: &str) -> Option<String> {
    let syntax = SYNTAX_SET.find_syntax_by_token(token)?;
    let mut generator =
        ClassedHTMLGenerator::new_with_class_style(syntax, &SYNTAX_SET, ClassStyle::Spaced);
    for line in LinesWithEndings::from(code) {
        generator
            .parse_html_for_line_which_includes_newline(line)
            .ok()?;
    }
    Some(generator.finalize())
}
