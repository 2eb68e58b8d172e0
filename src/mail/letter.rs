//! Letter body helpers.

use std::sync::LazyLock;

use regex::Regex;

/// Content-ID of the inline logo part.
pub const LOGO_CID: &str = "logo_cid";

/// The only placeholder the letter body supports.
pub const NAME_PLACEHOLDER: &str = "{{name}}";

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("valid paragraph regex"));

static BODY_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</body>").expect("valid body regex"));

/// Replace every `{{name}}` with the recipient's display name.
pub fn personalize_body(html: &str, name: &str) -> String {
    html.replace(NAME_PLACEHOLDER, name)
}

/// Render a plain-text letter as a right-to-left HTML document.
///
/// Paragraphs are separated by blank lines; single newlines become `<br>`.
pub fn text_to_html(text: &str) -> String {
    let cleaned = text.replace("\r\n", "\n");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return String::new();
    }

    let body: String = PARAGRAPH_BREAK
        .split(cleaned)
        .map(|para| {
            let lines: Vec<String> = para
                .split('\n')
                .map(|line| html_escape::encode_quoted_attribute(line).into_owned())
                .collect();
            format!("<p style=\"line-height: 1.6;\">{}</p>", lines.join("<br>"))
        })
        .collect();

    format!(
        "<!DOCTYPE html><html lang=\"he\"><head><meta charset=\"UTF-8\"></head>\
         <body style=\"direction: rtl; text-align: right; font-family: Arial, sans-serif; color: #333; margin: 20px;\">\
         {body}</body></html>"
    )
}

/// Insert an inline logo reference before `</body>`, or append it.
///
/// No-op when the body already references the logo.
pub fn inject_logo_cid(html: &str) -> String {
    if html.contains(&format!("cid:{LOGO_CID}")) {
        return html.to_string();
    }
    let img = format!(
        "<img src=\"cid:{LOGO_CID}\" style=\"max-width: 220px; height: auto; display: block; margin-bottom: 12px;\" />"
    );
    match BODY_CLOSE.find(html) {
        Some(m) => format!("{}{img}{}", &html[..m.start()], &html[m.start()..]),
        None => format!("{html}{img}"),
    }
}
