//! Symbol navigation: definitions, references, hover, completions, symbols.

use std::collections::BTreeMap;
use std::path::Path;

use holt_core::Position;
use holt_rpc::types::DocumentSymbol;
use holt_rpc::EditorClient;

use crate::types::{
    completion_kind_name, symbol_kind_name, Completion, CompletionsResult, Definition,
    FileReferences, HoverInfo, Reference, ReferencesResult, Symbol, SymbolsResult,
};
use crate::{ready_buffer, IdeConfig, IdeResult};

#[derive(Clone)]
pub struct Navigation {
    client: EditorClient,
    config: IdeConfig,
}

impl Navigation {
    pub fn new(client: EditorClient, config: IdeConfig) -> Self {
        Self { client, config }
    }

    /// Where the symbol at the given position is defined. Multiple locations
    /// mean the language server reported alternatives.
    pub async fn find_definition(
        &self,
        file: impl AsRef<Path>,
        position: Position,
    ) -> IdeResult<Vec<Definition>> {
        let buffer = ready_buffer(&self.client, &self.config.lsp_ready, file).await?;
        let locations = self.client.lsp_definition(buffer, position).await?;

        let resolver = self.client.resolver();
        Ok(locations
            .into_iter()
            .map(|loc| Definition {
                file: resolver.display_path(&loc.path),
                line: loc.line,
                column: loc.column,
            })
            .collect())
    }

    pub async fn find_references(
        &self,
        file: impl AsRef<Path>,
        position: Position,
        include_declaration: bool,
    ) -> IdeResult<ReferencesResult> {
        let buffer = ready_buffer(&self.client, &self.config.lsp_ready, file).await?;
        let locations = self
            .client
            .lsp_references(buffer, position, include_declaration)
            .await?;

        let resolver = self.client.resolver();
        let references: Vec<Reference> = locations
            .into_iter()
            .map(|loc| Reference {
                file: resolver.display_path(&loc.path),
                line: loc.line,
                column: loc.column,
            })
            .collect();

        let mut by_file: BTreeMap<String, usize> = BTreeMap::new();
        for reference in &references {
            *by_file.entry(reference.file.clone()).or_default() += 1;
        }
        let mut grouped_by_file: Vec<FileReferences> = by_file
            .into_iter()
            .map(|(file, count)| FileReferences { file, count })
            .collect();
        grouped_by_file.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.file.cmp(&b.file)));

        Ok(ReferencesResult {
            total_count: references.len(),
            references,
            grouped_by_file,
        })
    }

    pub async fn hover(
        &self,
        file: impl AsRef<Path>,
        position: Position,
    ) -> IdeResult<Option<HoverInfo>> {
        let buffer = ready_buffer(&self.client, &self.config.lsp_ready, file).await?;
        let contents = self.client.lsp_hover(buffer, position).await?;
        Ok(contents.map(|contents| HoverInfo {
            contents,
            line: position.line,
            column: position.column,
        }))
    }

    /// Completions at the cursor, capped at `max_results` (the adapter
    /// default when `None`).
    pub async fn completions(
        &self,
        file: impl AsRef<Path>,
        position: Position,
        max_results: Option<usize>,
    ) -> IdeResult<CompletionsResult> {
        let buffer = ready_buffer(&self.client, &self.config.lsp_ready, file).await?;
        let mut items = self.client.lsp_completion(buffer, position).await?;

        // Servers rank with sort_text when present; respect it before
        // truncating.
        items.sort_by(|a, b| match (&a.sort_text, &b.sort_text) {
            (Some(a_key), Some(b_key)) => a_key.cmp(b_key),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.label.cmp(&b.label),
        });

        let total_count = items.len();
        let cap = max_results.unwrap_or(self.config.max_completions);
        let truncated = total_count > cap;
        items.truncate(cap);

        let completions: Vec<Completion> = items
            .into_iter()
            .map(|item| Completion {
                text: item.label,
                kind: item.kind.map(|k| completion_kind_name(k).to_string()),
                detail: item.detail,
                documentation: item.documentation,
            })
            .collect();

        Ok(CompletionsResult {
            returned_count: completions.len(),
            completions,
            total_count,
            truncated,
        })
    }

    /// The file's symbol outline, hierarchy preserved.
    pub async fn document_symbols(&self, file: impl AsRef<Path>) -> IdeResult<SymbolsResult> {
        let display = self.client.resolver().display_path(file.as_ref());
        let buffer = ready_buffer(&self.client, &self.config.lsp_ready, file).await?;
        let raw = self.client.lsp_document_symbols(buffer).await?;

        let symbols: Vec<Symbol> = raw.into_iter().map(convert_symbol).collect();
        let total_count = count_symbols(&symbols);

        Ok(SymbolsResult {
            symbols,
            file: display,
            total_count,
        })
    }
}

fn convert_symbol(raw: DocumentSymbol) -> Symbol {
    Symbol {
        name: raw.name,
        kind: symbol_kind_name(raw.kind).to_string(),
        line: raw.line,
        column: raw.column,
        children: raw.children.into_iter().map(convert_symbol).collect(),
    }
}

fn count_symbols(symbols: &[Symbol]) -> usize {
    symbols
        .iter()
        .map(|symbol| 1 + count_symbols(&symbol.children))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_symbols_are_counted() {
        let symbols = vec![Symbol {
            name: "Outer".to_string(),
            kind: "class".to_string(),
            line: 1,
            column: 0,
            children: vec![
                Symbol {
                    name: "method_a".to_string(),
                    kind: "method".to_string(),
                    line: 2,
                    column: 4,
                    children: Vec::new(),
                },
                Symbol {
                    name: "method_b".to_string(),
                    kind: "method".to_string(),
                    line: 5,
                    column: 4,
                    children: Vec::new(),
                },
            ],
        }];
        assert_eq!(count_symbols(&symbols), 3);
    }
}
