//! Row assembly over per-field column scanners

use super::{BoxScanner, StableMergeIterator, TableScan};
use crate::error::Result;
use crate::types::{Key, Row, Value};

type Cell = (Key, usize, Value);
type CellMerge = StableMergeIterator<BoxScanner<Cell>, Cell, Key, fn(&Cell) -> Key>;

fn cell_key(cell: &Cell) -> Key {
    cell.0
}

/// Zips key-ordered columns into key-ordered rows.
///
/// Columns are visited in field-name order so the cells of each row come
/// out sorted by field. Keys present in no column never produce a row.
pub struct RowScanner {
    fields: Vec<String>,
    cells: CellMerge,
    pending: Option<Cell>,
}

impl RowScanner {
    pub fn new(columns: TableScan) -> Self {
        let mut fields = Vec::with_capacity(columns.len());
        let mut sources: Vec<BoxScanner<Cell>> = Vec::with_capacity(columns.len());
        for (index, (field, scanner)) in columns.into_iter().enumerate() {
            fields.push(field);
            sources.push(Box::new(
                scanner.map(move |cell| cell.map(|(key, value)| (key, index, value))),
            ));
        }
        Self {
            fields,
            cells: StableMergeIterator::new(sources, cell_key as fn(&Cell) -> Key),
            pending: None,
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    fn next_cell(&mut self) -> Option<Result<Cell>> {
        match self.pending.take() {
            Some(cell) => Some(Ok(cell)),
            None => self.cells.next(),
        }
    }
}

impl Iterator for RowScanner {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, index, value) = match self.next_cell()? {
            Ok(cell) => cell,
            Err(e) => return Some(Err(e)),
        };
        let mut row = Row::new(key);
        row.cells.push((self.fields[index].clone(), value));

        loop {
            match self.cells.next() {
                Some(Ok(cell)) if cell.0 == key => {
                    row.cells.push((self.fields[cell.1].clone(), cell.2));
                }
                Some(Ok(cell)) => {
                    self.pending = Some(cell);
                    break;
                }
                Some(Err(e)) => return Some(Err(e)),
                None => break,
            }
        }
        Some(Ok(row))
    }
}
