use crate::analysis::{AnalysisOutcome, ANALYSIS_UNAVAILABLE};
use crate::config::{APP_NAME, APP_VERSION};
use crate::pipeline::escape_html;

/// Report section text for a POST without a requisition code.
pub const MISSING_CODE_MESSAGE: &str = "Por favor, insira o Código da Requisição.";

/// The three page sections, each already an HTML fragment.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PageView {
    pub code: String,
    pub report_html: String,
    pub answer_html: String,
    pub billed_html: String,
}

impl PageView {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn missing_code() -> Self {
        Self {
            report_html: paragraph(MISSING_CODE_MESSAGE),
            ..Self::default()
        }
    }

    pub fn from_outcome(code: &str, outcome: AnalysisOutcome) -> Self {
        match outcome {
            AnalysisOutcome::FetchFailed { report_text } => Self {
                code: code.to_string(),
                report_html: format!("<pre>{}</pre>", escape_html(&report_text)),
                answer_html: paragraph(ANALYSIS_UNAVAILABLE),
                billed_html: String::new(),
            },
            AnalysisOutcome::Rendered {
                report_html,
                answer_html,
                billed_html,
            } => Self {
                code: code.to_string(),
                report_html,
                answer_html,
                billed_html,
            },
        }
    }
}

fn paragraph(text: &str) -> String {
    format!("<p>{}</p>", escape_html(text))
}

fn section(title: &str, body: &str) -> String {
    if body.is_empty() {
        return String::new();
    }
    format!("<section class=\"card\">\n<h2>{title}</h2>\n{body}\n</section>\n")
}

// ═══════════════════════════════════════════════════════════
// HTML rendering: self-contained page (no external assets)
// ═══════════════════════════════════════════════════════════

/// Render the lookup form plus whichever sections have content.
pub fn render_page(view: &PageView) -> String {
    let code = escape_html(&view.code);
    let report = section("Dados do Laudo (API)", &view.report_html);
    let answer = section("Análise da IA", &view.answer_html);
    let billed = section("Procedimentos Cobrados", &view.billed_html);

    format!(
        r##"<!DOCTYPE html>
<html lang="pt-BR">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{APP_NAME}</title>
<style>
*,*::before,*::after{{box-sizing:border-box}}
body{{margin:0;font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,sans-serif;background:#fafaf9;color:#1c1917;padding:24px}}
main{{max-width:960px;margin:0 auto}}
h1{{font-size:1.5rem;margin:0 0 16px}}
.card{{background:#fff;border-radius:12px;box-shadow:0 4px 24px rgba(0,0,0,.08);padding:24px;margin-bottom:16px;overflow-x:auto}}
form{{display:flex;gap:8px}}
input[type=text]{{flex:1;padding:12px;border:1px solid #d6d3d1;border-radius:8px;font-size:1rem}}
button{{padding:12px 20px;border:none;border-radius:8px;background:#2DD4BF;color:#fff;font-weight:600;cursor:pointer}}
table{{border-collapse:collapse;width:100%}}
th,td{{border:1px solid #e7e5e4;padding:6px 10px;text-align:left}}
blockquote{{margin:8px 0;padding-left:12px;border-left:3px solid #2DD4BF;color:#44403c}}
pre{{white-space:pre-wrap;word-break:break-word}}
.version{{color:#a8a29e;font-size:.75rem;text-align:right}}
</style>
</head>
<body>
<main>
<h1>Análise de Faturamento de Patologia</h1>
<section class="card">
<form method="post" action="/">
<input type="text" name="codrequisicao" placeholder="Código da Requisição" value="{code}" autofocus>
<button type="submit">Analisar</button>
</form>
</section>
{report}{answer}{billed}<p class="version">v{APP_VERSION}</p>
</main>
</body>
</html>"##
    )
}
