use std::fmt::Write;

use crate::resolve::ListingEntry;

/// Render a directory listing as a single HTML document.
///
/// `segments` are the decoded segments of the listed directory; links are
/// absolute so they work with or without a trailing slash on the request.
pub fn render_listing(segments: &[String], entries: &[ListingEntry]) -> String {
    let display = format!("/{}", segments.join("/"));
    let mut base = String::from("/");
    for segment in segments {
        base.push_str(&urlencoding::encode(segment));
        base.push('/');
    }

    let title = escape_html(&display);
    let mut html = format!(
        "<html><head><title>Index of {title}</title></head><body><h1>Index of {title}</h1>"
    );
    for entry in entries {
        let tag = if entry.is_dir { "dir" } else { "file" };
        let _ = write!(
            html,
            "{tag} <a href='{base}{href}'>{name}</a><br/>",
            href = urlencoding::encode(&entry.name),
            name = escape_html(&entry.name),
        );
    }
    html.push_str("</body></html>");
    html
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
