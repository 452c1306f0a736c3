//! File set tasks

use super::{AuxNode, AuxNodes};
use crate::data::FleurinpBuilder;
use crate::error::{FleurinpError, Result};
use crate::task::{FileTask, SetFile};

/// Run every file task against `builder`, in order
///
/// # Errors
/// [`FleurinpError::Argument`] for a `set_file` without exactly one source,
/// [`FleurinpError::MissingNode`] for an unknown side-table key,
/// [`FleurinpError::InvalidInput`] when removing the primary file
pub fn apply_file_tasks(builder: &mut FleurinpBuilder, tasks: &[FileTask], nodes: &AuxNodes) -> Result<()> {
    for task in tasks {
        match task {
            FileTask::SetFile(set) => {
                let bytes = file_content(set, nodes)?;
                tracing::debug!(file = %set.filename, bytes = bytes.len(), "set_file");
                builder.set_file(set.filename.clone(), bytes);
            }
            FileTask::DelFile(del) => {
                tracing::debug!(file = %del.filename, "del_file");
                builder.del_file(&del.filename)?;
            }
        }
    }
    Ok(())
}

fn file_content(set: &SetFile, nodes: &AuxNodes) -> Result<Vec<u8>> {
    match (&set.text, &set.node) {
        (Some(text), None) => Ok(text.as_bytes().to_vec()),
        (None, Some(key)) => {
            let data = match nodes.get(key) {
                Some(AuxNode::Fleurinp(data)) => data,
                Some(AuxNode::Kpoints(_)) => {
                    return Err(FleurinpError::argument(format!(
                        "node '{key}' is a k-point set, not an input deck"
                    )))
                }
                None => return Err(FleurinpError::MissingNode(key.clone())),
            };
            let source = set.source_file.as_deref().unwrap_or(&set.filename);
            data.file(source)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| FleurinpError::path_not_found(format!("{key}:{source}")))
        }
        _ => Err(FleurinpError::argument(format!(
            "set_file '{}' needs exactly one of text and node",
            set.filename
        ))),
    }
}
