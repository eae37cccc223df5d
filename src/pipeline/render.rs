use pulldown_cmark::{html, Event, Options, Parser};
use serde_json::Value;

use crate::lab::report::{display_value, field_text};

/// Heading that opens the billed-procedure listing.
pub const BILLED_HEADER: &str = "### Procedimentos Cobrados (API)\n\n";

const RECORD_SEPARATOR: &str = "\n\n---\n\n";

/// Markdown bullet listing of the procedures the lab already billed.
///
/// Object entries render their code, description, quantity and total;
/// anything else becomes a single "Dado inválido" bullet.
pub fn format_billed_procedures(billed: &[Value]) -> String {
    let mut out = String::from(BILLED_HEADER);

    for entry in billed {
        match entry.as_object() {
            Some(record) => {
                out.push_str(&format!(
                    "*   **Código:** `{}`\n*   **Descrição:** {}\n*   **Quantidade:** {}\n*   **Valor Total:** R$ {}",
                    field_text(record, "codigo"),
                    field_text(record, "descricao"),
                    field_text(record, "quantidade"),
                    field_text(record, "valorTotal"),
                ));
            }
            None => {
                tracing::debug!(entry = %entry, "Billed procedure is not an object");
                out.push_str(&format!("*   Dado inválido: `{}`", display_value(entry)));
            }
        }
        out.push_str(RECORD_SEPARATOR);
    }

    out
}

/// Markdown to an HTML fragment.
///
/// Single newlines become `<br />`. Raw HTML in the source is emitted as
/// escaped text. `tables` enables GFM pipe tables.
pub fn markdown_to_html(text: &str, tables: bool) -> String {
    let mut options = Options::empty();
    if tables {
        options.insert(Options::ENABLE_TABLES);
    }

    let events = Parser::new_ext(text, options).map(|event| match event {
        Event::SoftBreak => Event::HardBreak,
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });

    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, events);
    out
}

/// Plain text for a `<pre>` block or attribute value.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
