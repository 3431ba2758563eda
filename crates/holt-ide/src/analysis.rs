//! Module dependency analysis.
//!
//! Imports come from the editor's syntax-tree query; reverse dependencies
//! come from a workspace search for the file's module name, filtered down to
//! lines that look like imports. Both are remote queries; nothing here
//! parses source.

use std::collections::BTreeSet;
use std::path::Path;

use holt_rpc::EditorClient;

use crate::types::DependencyGraph;
use crate::{ready_buffer, IdeConfig, IdeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Imports,
    ImportedBy,
    Both,
}

#[derive(Clone)]
pub struct Analysis {
    client: EditorClient,
    config: IdeConfig,
}

impl Analysis {
    pub fn new(client: EditorClient, config: IdeConfig) -> Self {
        Self { client, config }
    }

    pub async fn analyze_dependencies(
        &self,
        file: impl AsRef<Path>,
        direction: Direction,
    ) -> IdeResult<DependencyGraph> {
        let resolver = self.client.resolver();
        let canonical = resolver.canonicalize(file.as_ref()).map_err(holt_rpc::RpcError::from)?;
        let display = resolver.display_path(&canonical);

        let imports = match direction {
            Direction::Imports | Direction::Both => {
                let buffer =
                    ready_buffer(&self.client, &self.config.lsp_ready, &canonical).await?;
                self.client.imports(buffer).await?
            }
            Direction::ImportedBy => Vec::new(),
        };

        let imported_by = match direction {
            Direction::ImportedBy | Direction::Both => {
                self.imported_by(&canonical).await?
            }
            Direction::Imports => Vec::new(),
        };

        Ok(DependencyGraph {
            file: display,
            imports,
            imported_by,
        })
    }

    async fn imported_by(&self, canonical: &Path) -> IdeResult<Vec<String>> {
        let Some(stem) = canonical.file_stem().and_then(|s| s.to_str()) else {
            return Ok(Vec::new());
        };

        let matches = self
            .client
            .workspace_search(stem, self.config.search_limit)
            .await?;

        let resolver = self.client.resolver();
        let mut importers = BTreeSet::new();
        for m in matches {
            if m.path == canonical {
                continue;
            }
            if looks_like_import(&m.text, stem) {
                importers.insert(resolver.display_path(&m.path));
            }
        }
        Ok(importers.into_iter().collect())
    }
}

/// Whether a matched line plausibly imports the named module. Deliberately
/// coarse: the searched text already contains the module name, this only
/// rules out plain usages.
fn looks_like_import(line: &str, stem: &str) -> bool {
    let trimmed = line.trim_start();
    if !trimmed.contains(stem) {
        return false;
    }
    trimmed.starts_with("import ")
        || trimmed.starts_with("from ")
        || trimmed.starts_with("use ")
        || trimmed.contains("require(")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_shaped_lines_are_recognized() {
        assert!(looks_like_import("import utils", "utils"));
        assert!(looks_like_import("from utils import helper", "utils"));
        assert!(looks_like_import("use crate::utils;", "utils"));
        assert!(looks_like_import("const utils = require('./utils');", "utils"));

        assert!(!looks_like_import("result = utils.run()", "utils"));
        assert!(!looks_like_import("import other_module", "utils"));
    }
}
