//! OpenDAL operator factory

use ddrop_core::{DropError, DropResult};
use opendal::Operator;

/// Build an in-memory OpenDAL operator.
///
/// No RetryLayer: a failed transfer aborts the drop, it is never retried.
pub fn build_memory_operator() -> DropResult<Operator> {
    let op = Operator::new(opendal::services::Memory::default())
        .map_err(|e| DropError::Config(format!("creating OpenDAL memory operator: {e}")))?
        .layer(opendal::layers::LoggingLayer::default())
        .finish();
    Ok(op)
}
