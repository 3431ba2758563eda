//! Language-server diagnostics for a file.

use std::path::Path;

use holt_rpc::EditorClient;

use crate::types::{Diagnostic, DiagnosticSeverity};
use crate::{ready_buffer, IdeConfig, IdeResult};

#[derive(Clone)]
pub struct Diagnostics {
    client: EditorClient,
    config: IdeConfig,
}

impl Diagnostics {
    pub fn new(client: EditorClient, config: IdeConfig) -> Self {
        Self { client, config }
    }

    /// Current diagnostics, most severe first, then by position.
    pub async fn get_diagnostics(&self, file: impl AsRef<Path>) -> IdeResult<Vec<Diagnostic>> {
        let display = self.client.resolver().display_path(file.as_ref());
        let buffer = ready_buffer(&self.client, &self.config.lsp_ready, file).await?;
        let raw = self.client.diagnostics(buffer).await?;

        let mut diagnostics: Vec<Diagnostic> = raw
            .into_iter()
            .map(|d| Diagnostic {
                file: display.clone(),
                line: d.line,
                column: d.column,
                severity: DiagnosticSeverity::from_lsp(d.severity),
                message: d.message,
                source: d.source,
            })
            .collect();
        diagnostics.sort_by_key(|d| (severity_rank(d.severity), d.line, d.column));

        Ok(diagnostics)
    }
}

fn severity_rank(severity: DiagnosticSeverity) -> u8 {
    match severity {
        DiagnosticSeverity::Error => 0,
        DiagnosticSeverity::Warning => 1,
        DiagnosticSeverity::Information => 2,
        DiagnosticSeverity::Hint => 3,
    }
}
