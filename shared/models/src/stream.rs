use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One unit of the row stream handed to the ingestion pipeline.
///
/// `count` is the total row count known at stream start and is repeated on
/// every emitted row so the consumer can report progress without buffering.
/// Null or empty cells are omitted from `data_row`, not stored as explicit
/// nulls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RowMessage {
    pub source_id: i64,
    pub count: i64,
    pub data_row: HashMap<String, String>,
}

impl RowMessage {
    pub fn new(source_id: i64, count: i64, data_row: HashMap<String, String>) -> Self {
        Self {
            source_id,
            count,
            data_row,
        }
    }
}
