//! Markdown rendering for assistant content.
//!
//! Rendering is a pure function of the text. The presenter re-renders the
//! whole accumulated prefix after every revealed unit, so partial input
//! (an unterminated fence, half a table) must render without error.

use std::sync::Arc;

use pulldown_cmark::{html, CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

pub trait MarkdownRenderer: Send + Sync {
    fn render(&self, text: &str) -> String;
}

fn parser_options() -> Options {
    Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS
}

/// Renders markdown to HTML markup.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlRenderer;

impl MarkdownRenderer for HtmlRenderer {
    fn render(&self, text: &str) -> String {
        let parser = Parser::new_ext(text, parser_options());
        let mut markup = String::with_capacity(text.len() * 3 / 2);
        html::push_html(&mut markup, parser);
        markup
    }
}

/// Passes text through untouched. Used when markdown is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainRenderer;

impl MarkdownRenderer for PlainRenderer {
    fn render(&self, text: &str) -> String {
        text.to_string()
    }
}

pub fn renderer_for(markdown: bool) -> Arc<dyn MarkdownRenderer> {
    if markdown {
        Arc::new(HtmlRenderer)
    } else {
        Arc::new(PlainRenderer)
    }
}

/// A fenced or indented code block found in finalized content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub index: usize,
    pub language: Option<String>,
    pub content: String,
}

fn language_hint(kind: CodeBlockKind) -> Option<String> {
    match kind {
        CodeBlockKind::Indented => None,
        CodeBlockKind::Fenced(info) => info
            .split_ascii_whitespace()
            .next()
            .filter(|lang| !lang.is_empty())
            .map(str::to_string),
    }
}

pub fn extract_code_blocks(text: &str) -> Vec<CodeBlock> {
    let mut blocks = Vec::new();
    let mut current: Option<(Option<String>, String)> = None;

    for event in Parser::new_ext(text, parser_options()) {
        match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                current = Some((language_hint(kind), String::new()));
            }
            Event::Text(chunk) => {
                if let Some((_, content)) = current.as_mut() {
                    content.push_str(&chunk);
                }
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some((language, content)) = current.take() {
                    blocks.push(CodeBlock {
                        index: blocks.len(),
                        language,
                        content,
                    });
                }
            }
            _ => {}
        }
    }

    blocks
}
