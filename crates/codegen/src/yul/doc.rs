/// Simple document tree used to build readable Yul output with indentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum YulDoc {
    /// Single line of text.
    Line(String),
    /// Block with standard indentation. The caption is everything before `{`.
    Block { caption: String, body: Vec<YulDoc> },
}

impl YulDoc {
    /// Convenience helper for creating a `Line`.
    pub(super) fn line(text: impl Into<String>) -> Self {
        YulDoc::Line(text.into())
    }

    /// Convenience helper for creating a `Block`.
    pub(super) fn block(caption: impl Into<String>, body: Vec<YulDoc>) -> Self {
        YulDoc::Block {
            caption: caption.into(),
            body,
        }
    }
}

/// Recursively renders a YulDoc tree into formatted lines with the requested indentation.
///
/// Blocks without a body render on a single line as `caption{ }`.
pub(super) fn render_docs(nodes: &[YulDoc], indent: usize, out: &mut Vec<String>) {
    for node in nodes {
        let indent_str = " ".repeat(indent);
        match node {
            YulDoc::Line(text) if text.is_empty() => out.push(String::new()),
            YulDoc::Line(text) => out.push(format!("{indent_str}{text}")),
            YulDoc::Block { caption, body } if body.is_empty() => {
                out.push(format!("{indent_str}{caption}{{ }}"));
            }
            YulDoc::Block { caption, body } => {
                out.push(format!("{indent_str}{caption}{{"));
                render_docs(body, indent + 2, out);
                out.push(format!("{indent_str}}}"));
            }
        }
    }
}

/// Joins rendered lines while trimming trailing empty entries.
pub(super) fn join_lines(mut lines: Vec<String>) -> String {
    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}
