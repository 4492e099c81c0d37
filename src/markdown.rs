//! Markdown to styled terminal lines.
//!
//! Parsing is done by pulldown-cmark; this module only maps its events onto
//! ratatui spans. Wrapping is left to the `Paragraph` that displays the
//! lines. Input is often an incomplete document (a reply still streaming),
//! which pulldown-cmark handles without complaint.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
};

pub fn render(text: &str) -> Vec<Line<'static>> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let options = Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;
    let mut renderer = Renderer::default();
    for event in Parser::new_ext(text, options) {
        renderer.process_event(event);
    }
    renderer.finish()
}

#[derive(Debug)]
struct ListLevel {
    /// Next number for ordered lists.
    next: Option<u64>,
}

#[derive(Default)]
struct Renderer {
    lines: Vec<Line<'static>>,
    spans: Vec<Span<'static>>,
    styles: Vec<Style>,
    lists: Vec<ListLevel>,
    /// Marker waiting to be attached to the first line of a list item.
    item_marker: Option<String>,
    quote_depth: usize,
    in_code_block: bool,
}

impl Renderer {
    fn style(&self) -> Style {
        self.styles
            .iter()
            .fold(Style::default(), |acc, style| acc.patch(*style))
    }

    fn process_event(&mut self, event: Event) {
        match event {
            Event::Start(tag) => self.start_tag(tag),
            Event::End(tag) => self.end_tag(tag),
            Event::Text(text) => self.add_text(&text),
            Event::Code(code) => {
                let style = self.style().fg(Color::Yellow);
                self.spans.push(Span::styled(code.into_string(), style));
            }
            Event::Html(html) | Event::InlineHtml(html) => {
                // Shown dimmed so unhidden reasoning tags stay visible
                let style = self.style().fg(Color::DarkGray);
                for (i, part) in html.split('\n').enumerate() {
                    if i > 0 {
                        self.flush_line();
                    }
                    if !part.is_empty() {
                        self.spans.push(Span::styled(part.to_string(), style));
                    }
                }
            }
            Event::SoftBreak => self.spans.push(Span::styled(" ", self.style())),
            Event::HardBreak => self.flush_line(),
            Event::Rule => {
                self.flush_line();
                self.lines.push(Line::from(Span::styled(
                    "─".repeat(40),
                    Style::default().fg(Color::DarkGray),
                )));
                self.end_block();
            }
            Event::TaskListMarker(checked) => {
                let marker = if checked { "[x] " } else { "[ ] " };
                self.spans
                    .push(Span::styled(marker, Style::default().fg(Color::Cyan)));
            }
            _ => {}
        }
    }

    fn start_tag(&mut self, tag: Tag) {
        match tag {
            Tag::Heading { level, .. } => {
                self.flush_line();
                let style = match level {
                    HeadingLevel::H1 => Style::default()
                        .fg(Color::Magenta)
                        .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
                    HeadingLevel::H2 => {
                        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
                    }
                    _ => Style::default().add_modifier(Modifier::BOLD),
                };
                self.styles.push(style);
            }
            Tag::CodeBlock(kind) => {
                self.flush_line();
                self.in_code_block = true;
                if let CodeBlockKind::Fenced(lang) = kind {
                    if !lang.is_empty() {
                        let label = self.prefixed(vec![Span::styled(
                            format!("┌ {lang}"),
                            Style::default().fg(Color::DarkGray),
                        )]);
                        self.lines.push(label);
                    }
                }
                self.styles.push(Style::default().fg(Color::Green));
            }
            Tag::List(start) => {
                self.flush_line();
                self.lists.push(ListLevel { next: start });
            }
            Tag::Item => {
                self.flush_line();
                let marker = match self.lists.last_mut() {
                    Some(ListLevel { next: Some(n) }) => {
                        let marker = format!("{n}. ");
                        *n += 1;
                        marker
                    }
                    _ => "• ".to_string(),
                };
                self.item_marker = Some(marker);
            }
            Tag::BlockQuote(_) => {
                self.flush_line();
                self.quote_depth += 1;
                self.styles.push(Style::default().add_modifier(Modifier::ITALIC));
            }
            Tag::Emphasis => self.styles.push(Style::default().add_modifier(Modifier::ITALIC)),
            Tag::Strong => self.styles.push(Style::default().add_modifier(Modifier::BOLD)),
            Tag::Strikethrough => self
                .styles
                .push(Style::default().add_modifier(Modifier::CROSSED_OUT)),
            Tag::Link { .. } => self.styles.push(
                Style::default()
                    .fg(Color::Blue)
                    .add_modifier(Modifier::UNDERLINED),
            ),
            _ => {}
        }
    }

    fn end_tag(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                self.flush_line();
                self.end_block();
            }
            TagEnd::Heading(_) => {
                self.flush_line();
                self.styles.pop();
                self.end_block();
            }
            TagEnd::CodeBlock => {
                self.flush_line();
                self.in_code_block = false;
                self.styles.pop();
                self.end_block();
            }
            TagEnd::List(_) => {
                self.flush_line();
                self.lists.pop();
                self.end_block();
            }
            TagEnd::Item => self.flush_line(),
            TagEnd::BlockQuote(_) => {
                self.flush_line();
                self.quote_depth = self.quote_depth.saturating_sub(1);
                self.styles.pop();
                self.end_block();
            }
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough | TagEnd::Link => {
                self.styles.pop();
            }
            _ => {}
        }
    }

    fn add_text(&mut self, text: &str) {
        let style = self.style();
        if self.in_code_block {
            // Code text arrives newline-terminated; keep its indentation
            for line in text.lines() {
                self.spans.push(Span::styled(format!("  {line}"), style));
                self.flush_line();
            }
            return;
        }
        self.spans.push(Span::styled(text.to_string(), style));
    }

    /// Leading spans for quote bars and list indentation.
    fn prefixed(&mut self, spans: Vec<Span<'static>>) -> Line<'static> {
        let mut prefix = Vec::new();
        if self.quote_depth > 0 {
            prefix.push(Span::styled(
                "│ ".repeat(self.quote_depth),
                Style::default().fg(Color::DarkGray),
            ));
        }
        if !self.lists.is_empty() {
            let depth = self.lists.len() - 1;
            match self.item_marker.take() {
                Some(marker) => {
                    prefix.push(Span::raw("  ".repeat(depth)));
                    prefix.push(Span::styled(marker, Style::default().fg(Color::Cyan)));
                }
                None => prefix.push(Span::raw("  ".repeat(depth + 1))),
            }
        }
        prefix.extend(spans);
        Line::from(prefix)
    }

    fn flush_line(&mut self) {
        if self.spans.is_empty() {
            return;
        }
        let spans = std::mem::take(&mut self.spans);
        let line = self.prefixed(spans);
        self.lines.push(line);
    }

    /// One blank line between top-level blocks.
    fn end_block(&mut self) {
        if self.lists.is_empty() && self.quote_depth == 0 && !self.last_line_blank() {
            self.lines.push(Line::default());
        }
    }

    fn last_line_blank(&self) -> bool {
        self.lines.last().map_or(true, |line| line.width() == 0)
    }

    fn finish(mut self) -> Vec<Line<'static>> {
        self.flush_line();
        while self.lines.last().is_some_and(|line| line.width() == 0) {
            self.lines.pop();
        }
        self.lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(line: &Line) -> String {
        line.spans.iter().map(|span| span.content.as_ref()).collect()
    }

    fn plain_lines(text: &str) -> Vec<String> {
        render(text).iter().map(plain).collect()
    }

    #[test]
    fn test_empty_input() {
        assert!(render("").is_empty());
        assert!(render("  \n\n").is_empty());
    }

    #[test]
    fn test_paragraphs_separated_by_blank_line() {
        assert_eq!(
            plain_lines("First paragraph\nstill first.\n\nSecond."),
            vec!["First paragraph still first.", "", "Second."]
        );
    }

    #[test]
    fn test_bold_and_italic_are_styled() {
        let lines = render("plain **bold** and *soft*");
        assert_eq!(lines.len(), 1);
        let bold = lines[0].spans.iter().find(|s| s.content == "bold").unwrap();
        assert!(bold.style.add_modifier.contains(Modifier::BOLD));
        let soft = lines[0].spans.iter().find(|s| s.content == "soft").unwrap();
        assert!(soft.style.add_modifier.contains(Modifier::ITALIC));
        let plain_span = lines[0].spans.iter().find(|s| s.content == "plain ").unwrap();
        assert!(!plain_span.style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_heading() {
        let lines = render("# Title\n\nBody");
        assert_eq!(plain(&lines[0]), "Title");
        assert!(lines[0].spans[0].style.add_modifier.contains(Modifier::BOLD));
        assert_eq!(plain(&lines[2]), "Body");
    }

    #[test]
    fn test_lists() {
        assert_eq!(
            plain_lines("- one\n- two\n  - nested\n\n1. first\n2. second"),
            vec!["• one", "• two", "  • nested", "", "1. first", "2. second"]
        );
    }

    #[test]
    fn test_task_list() {
        assert_eq!(plain_lines("- [x] done\n- [ ] todo"), vec!["• [x] done", "• [ ] todo"]);
    }

    #[test]
    fn test_code_block_keeps_lines() {
        let lines = plain_lines("```rust\nfn main() {\n    run();\n}\n```\nafter");
        assert_eq!(
            lines,
            vec!["┌ rust", "  fn main() {", "      run();", "  }", "", "after"]
        );
    }

    #[test]
    fn test_unclosed_code_fence_mid_stream() {
        let lines = plain_lines("Here:\n\n```\nlet x = 1;\nlet y");
        assert_eq!(lines, vec!["Here:", "", "  let x = 1;", "  let y"]);
    }

    #[test]
    fn test_inline_code_and_quote() {
        let lines = render("> use `cargo`");
        assert_eq!(lines.len(), 1);
        assert_eq!(plain(&lines[0]), "│ use cargo");
        let code = lines[0].spans.iter().find(|s| s.content == "cargo").unwrap();
        assert_eq!(code.style.fg, Some(Color::Yellow));
    }

    #[test]
    fn test_html_is_shown_dimmed() {
        let lines = render("<think>\nhmm\n</think>\n\nAnswer");
        let joined: Vec<String> = lines.iter().map(plain).collect();
        assert!(joined.contains(&"<think>".to_string()));
        assert_eq!(joined.last().map(String::as_str), Some("Answer"));
    }
}
