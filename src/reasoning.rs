//! Hides the "thinking" sections that reasoning models emit ahead of their
//! answer. Applied to displayed text only; the response buffer is untouched.

use std::sync::LazyLock;

use regex::Regex;

const OPENERS: [&str; 3] = ["<think>", "<thinking>", "[THINKING]"];

const REASONING_LABEL: &str = "**Reasoning:**";

static CLOSED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<think>.*?</think>|<thinking>.*?</thinking>|\[THINKING\].*?\[/THINKING\]")
        .expect("valid reasoning block pattern")
});

static OPEN_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<think>|<thinking>|\[THINKING\]").expect("valid reasoning opener pattern")
});

static REASONING_PARAGRAPH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\*\*Reasoning:\*\*.*?(\n\n|\z)").expect("valid reasoning paragraph pattern")
});

static EXTRA_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid newline pattern"));

/// Strip reasoning from a response.
///
/// While `streaming`, an unterminated block is assumed to still be growing
/// and everything from its opener on is hidden. A finished response keeps a
/// lone opener as literal text.
pub fn strip_reasoning(text: &str, streaming: bool) -> String {
    let mut cleaned = CLOSED_BLOCK.replace_all(text, "").into_owned();

    if streaming {
        if let Some(open) = OPEN_BLOCK.find(&cleaned) {
            cleaned.truncate(open.start());
        }
        trim_partial_opener(&mut cleaned);
    }

    let cleaned = REASONING_PARAGRAPH.replace_all(&cleaned, "$1");
    let cleaned = EXTRA_NEWLINES.replace_all(&cleaned, "\n\n");
    cleaned.trim().to_string()
}

/// Drop a trailing fragment such as `<thin` that may grow into an opener.
fn trim_partial_opener(text: &mut String) {
    let cut = OPENERS
        .into_iter()
        .flat_map(|opener| (2..opener.len()).map(move |len| &opener[..len]))
        .filter(|prefix| text.ends_with(prefix))
        .map(str::len)
        .max();

    if let Some(len) = cut {
        text.truncate(text.len() - len);
    }
}

/// The part of a filtered streaming snapshot that later snapshots can only
/// extend. A trailing fragment such as `<` or `**Rea` may still turn into
/// hidden reasoning, so it is held back.
pub fn settled(filtered: &str) -> &str {
    let cut = OPENERS
        .into_iter()
        .chain([REASONING_LABEL])
        .flat_map(|marker| (1..marker.len()).map(move |len| &marker[..len]))
        .filter(|prefix| filtered.ends_with(prefix))
        .map(str::len)
        .max()
        .unwrap_or(0);

    filtered[..filtered.len() - cut].trim_end()
}
