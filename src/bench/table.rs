//! Latency table: `[sample_index][group_index]`, one sample per cell

use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::error::{BenchError, Result};
use crate::types::LatencySample;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatencyTable {
    group_size: usize,
    group_count: usize,
    cells: Vec<Option<LatencySample>>,
}

impl LatencyTable {
    pub fn new(group_size: usize, group_count: usize) -> Self {
        Self {
            group_size,
            group_count,
            cells: vec![None; group_size * group_count],
        }
    }

    /// `(group_size, group_count)`: rows by columns
    pub fn shape(&self) -> (usize, usize) {
        (self.group_size, self.group_count)
    }

    fn index(&self, sample_index: usize, group_index: usize) -> Option<usize> {
        (sample_index < self.group_size && group_index < self.group_count)
            .then(|| sample_index * self.group_count + group_index)
    }

    /// Store the sample of run `(sample_index, group_index)`. Cells are
    /// written exactly once.
    pub fn record(
        &mut self,
        sample_index: usize,
        group_index: usize,
        sample: LatencySample,
    ) -> Result<()> {
        let index = self.index(sample_index, group_index).ok_or(BenchError::Table {
            sample_index,
            group_index,
            problem: "is out of bounds",
        })?;
        let cell = &mut self.cells[index];
        if cell.is_some() {
            return Err(BenchError::Table {
                sample_index,
                group_index,
                problem: "was already recorded",
            });
        }
        *cell = Some(sample);
        Ok(())
    }

    pub fn get(&self, sample_index: usize, group_index: usize) -> Option<LatencySample> {
        self.index(sample_index, group_index).and_then(|i| self.cells[i])
    }

    pub fn recorded(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    /// Rows in sample order; missing cells read as `None`
    pub fn rows(&self) -> impl Iterator<Item = &[Option<LatencySample>]> {
        self.cells.chunks(self.group_count.max(1))
    }

    /// All samples of one group, in sample order
    pub fn column(&self, group_index: usize) -> Vec<Option<LatencySample>> {
        (0..self.group_size)
            .map(|sample_index| self.get(sample_index, group_index))
            .collect()
    }
}

impl Serialize for LatencyTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let rows: Vec<&[Option<LatencySample>]> = self.rows().collect();
        let mut state = serializer.serialize_struct("LatencyTable", 3)?;
        state.serialize_field("group_size", &self.group_size)?;
        state.serialize_field("group_count", &self.group_count)?;
        state.serialize_field("rows", &rows)?;
        state.end()
    }
}
