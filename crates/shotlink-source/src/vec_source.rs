//! In-memory record source.

use crate::{RecordSource, SourceResult};
use async_trait::async_trait;
use shotlink_database::MachineStatusRecord;
use std::collections::VecDeque;

/// Yields a fixed list of records immediately, in order.
#[derive(Debug, Default)]
pub struct VecRecordSource {
    pending: VecDeque<MachineStatusRecord>,
}

impl VecRecordSource {
    pub fn new(records: impl IntoIterator<Item = MachineStatusRecord>) -> Self {
        Self {
            pending: records.into_iter().collect(),
        }
    }
}

#[async_trait]
impl RecordSource for VecRecordSource {
    async fn next_record(&mut self) -> SourceResult<Option<MachineStatusRecord>> {
        Ok(self.pending.front().cloned())
    }

    async fn mark_consumed(&mut self, id: &str) -> SourceResult<()> {
        if let Some(index) = self.pending.iter().position(|record| record.id == id) {
            self.pending.remove(index);
        }
        Ok(())
    }

    fn remaining(&self) -> usize {
        self.pending.len()
    }
}
