//! Reading files through the editor's buffers.
//!
//! Going through the buffer rather than the filesystem keeps reads
//! consistent with what the language servers see.

use std::path::Path;

use holt_rpc::EditorClient;

use crate::types::FileContent;
use crate::IdeResult;

#[derive(Clone)]
pub struct Workspace {
    client: EditorClient,
}

impl Workspace {
    pub fn new(client: EditorClient) -> Self {
        Self { client }
    }

    /// Read a file, optionally restricted to a 1-based inclusive line range.
    /// `total_lines` always reflects the whole buffer.
    pub async fn read_file(
        &self,
        file: impl AsRef<Path>,
        range: Option<(u32, u32)>,
    ) -> IdeResult<FileContent> {
        let buffer = self.client.open_buffer(file).await?;

        let all = self.client.read_lines(buffer).await?;
        let total_lines = all.len();

        let content = match range {
            Some((start, end)) => {
                let start = start.max(1) as usize - 1;
                let end = (end as usize).min(total_lines);
                if start >= end {
                    String::new()
                } else {
                    all[start..end].join("\n")
                }
            }
            None => all.join("\n"),
        };

        Ok(FileContent {
            content,
            total_lines,
        })
    }
}
