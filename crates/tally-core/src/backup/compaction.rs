//! Reduction of a pending operation chain to at most one operation

use crate::error::{Error, Result};
use crate::models::{BackupMutation, BackupOperation, OperationKind};

/// Reduce all pending operations of one entity to zero or one operation.
///
/// The chain is ordered by timestamp first; ties keep their input order.
/// Returns `Ok(None)` when nothing is left to send to the server.
pub fn reduce(chain: &[BackupOperation]) -> Result<Option<BackupOperation>> {
    let mut chain = chain.to_vec();
    chain.sort_by_key(|op| op.timestamp);

    let (Some(first), Some(last)) = (chain.first(), chain.last()) else {
        return Ok(None);
    };

    if last.kind() == OperationKind::Delete {
        // The server never saw a locally created entity, so there is nothing to delete
        if first.kind() == OperationKind::Create || first.entity_id < 0 {
            return Ok(None);
        }
        return Ok(Some(last.clone()));
    }

    if chain.len() == 1 {
        return Ok(Some(first.clone()));
    }

    if first.kind() == OperationKind::Create {
        let Some(payload) = last.mutation.payload() else {
            return Err(invalid_chain(&chain));
        };
        let mut merged = first.clone();
        merged.mutation = BackupMutation::Create(payload.clone());
        return Ok(Some(merged));
    }

    if chain.iter().all(|op| op.kind() == OperationKind::Update) {
        return Ok(Some(last.clone()));
    }

    Err(invalid_chain(&chain))
}

fn invalid_chain(chain: &[BackupOperation]) -> Error {
    let Some((last, earlier)) = chain.split_last() else {
        return Error::InvalidInput("empty operation chain".to_string());
    };
    Error::InvalidOperationChain {
        entity_id: last.entity_id,
        entity_type: last.entity_type,
        incoming: last.kind(),
        chain: earlier.iter().map(BackupOperation::kind).collect(),
    }
}
