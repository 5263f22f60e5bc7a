use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::Error;
use crate::value::{Object, Value};
use crate::vm::state::State;

/// The `forloop` drop.
#[derive(Debug)]
pub(crate) struct ForLoop {
    pub name: String,
    pub length: usize,
    pub idx: AtomicUsize,
    pub parentloop: Option<Value>,
}

impl ForLoop {
    pub fn new(name: String, length: usize, parentloop: Option<Value>) -> Arc<ForLoop> {
        Arc::new(ForLoop {
            name,
            length,
            idx: AtomicUsize::new(0),
            parentloop,
        })
    }

    pub fn advance(&self) {
        self.idx.fetch_add(1, Ordering::Relaxed);
    }
}

impl Object for ForLoop {
    fn invokable_members(&self) -> &[&str] {
        &[
            "name",
            "length",
            "index",
            "index0",
            "rindex",
            "rindex0",
            "first",
            "last",
            "parentloop",
        ]
    }

    fn invoke(&self, _state: &State, name: &str) -> Result<Value, Error> {
        let idx = self.idx.load(Ordering::Relaxed);
        let len = self.length;
        Ok(match name {
            "name" => Value::from(self.name.as_str()),
            "length" => Value::from(len),
            "index" => Value::from(idx + 1),
            "index0" => Value::from(idx),
            "rindex" => Value::from(len.saturating_sub(idx)),
            "rindex0" => Value::from(len.saturating_sub(idx).saturating_sub(1)),
            "first" => Value::from(idx == 0),
            "last" => Value::from(idx + 1 == len),
            "parentloop" => self.parentloop.clone().unwrap_or(Value::NIL),
            _ => Value::UNDEFINED,
        })
    }

    fn render(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ForloopDrop")
    }
}

/// The `tablerowloop` drop.
#[derive(Debug)]
pub(crate) struct TableRowLoop {
    pub length: usize,
    pub cols: usize,
    pub idx: AtomicUsize,
}

impl TableRowLoop {
    pub fn new(length: usize, cols: Option<usize>) -> Arc<TableRowLoop> {
        let cols = match cols {
            Some(cols) if cols > 0 => cols,
            _ => length.max(1),
        };
        Arc::new(TableRowLoop {
            length,
            cols,
            idx: AtomicUsize::new(0),
        })
    }

    pub fn advance(&self) {
        self.idx.fetch_add(1, Ordering::Relaxed);
    }

    /// Zero based column of the current item.
    pub fn col0(&self) -> usize {
        self.idx.load(Ordering::Relaxed) % self.cols
    }

    /// One based row of the current item.
    pub fn row(&self) -> usize {
        self.idx.load(Ordering::Relaxed) / self.cols + 1
    }

    pub fn col_last(&self) -> bool {
        self.col0() + 1 == self.cols
    }
}

impl Object for TableRowLoop {
    fn invokable_members(&self) -> &[&str] {
        &[
            "length",
            "index",
            "index0",
            "rindex",
            "rindex0",
            "first",
            "last",
            "col",
            "col0",
            "col_first",
            "col_last",
            "row",
        ]
    }

    fn invoke(&self, _state: &State, name: &str) -> Result<Value, Error> {
        let idx = self.idx.load(Ordering::Relaxed);
        let len = self.length;
        Ok(match name {
            "length" => Value::from(len),
            "index" => Value::from(idx + 1),
            "index0" => Value::from(idx),
            "rindex" => Value::from(len.saturating_sub(idx)),
            "rindex0" => Value::from(len.saturating_sub(idx).saturating_sub(1)),
            "first" => Value::from(idx == 0),
            "last" => Value::from(idx + 1 == len),
            "col" => Value::from(self.col0() + 1),
            "col0" => Value::from(self.col0()),
            "col_first" => Value::from(self.col0() == 0),
            "col_last" => Value::from(self.col_last()),
            "row" => Value::from(self.row()),
            _ => Value::UNDEFINED,
        })
    }

    fn render(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TablerowloopDrop")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_row_positions() {
        let tablerow = TableRowLoop::new(5, Some(2));
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push((tablerow.row(), tablerow.col0(), tablerow.col_last()));
            tablerow.advance();
        }
        assert_eq!(
            seen,
            vec![
                (1, 0, false),
                (1, 1, true),
                (2, 0, false),
                (2, 1, true),
                (3, 0, false)
            ]
        );
        assert_eq!(TableRowLoop::new(0, None).cols, 1);
    }
}
