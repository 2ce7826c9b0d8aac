//! Lightweight chat markup.
//!
//! | Input           | Output                  |
//! |-----------------|-------------------------|
//! | `**text**`      | `<b>text</b>`           |
//! | `*text*`        | `<i>text</i>`           |
//! | `_text_`        | `<u>text</u>`           |
//! | `#r text r#`    | `<red> text </red>`     |
//! | `#g text g#`    | `<green> text </green>` |
//! | `#b text b#`    | `<blue> text </blue>`   |
//!
//! Rules apply in table order, so bold wins over italics for `**`.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

static RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"\*\*(.*?)\*\*", "<b>${1}</b>"),
        (r"\*(.*?)\*", "<i>${1}</i>"),
        (r"_(.*?)_", "<u>${1}</u>"),
        (r"#r(.*?)r#", "<red>${1}</red>"),
        (r"#g(.*?)g#", "<green>${1}</green>"),
        (r"#b(.*?)b#", "<blue>${1}</blue>"),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| match Regex::new(pattern) {
        Ok(regex) => Some((regex, replacement)),
        Err(e) => {
            tracing::error!(pattern, error = %e, "invalid markup rule");
            None
        }
    })
    .collect()
});

/// Applies the markup substitutions to one chat line.
pub fn render(text: &str) -> String {
    let mut out = text.to_string();
    for (regex, replacement) in RULES.iter() {
        let replaced = match regex.replace_all(&out, *replacement) {
            Cow::Borrowed(_) => continue,
            Cow::Owned(replaced) => replaced,
        };
        out = replaced;
    }
    out
}
