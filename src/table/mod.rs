// src/table/mod.rs
pub mod reader;
pub mod writer;

pub use reader::{read_all, read_path};
pub use writer::TableWriter;

/// A fully loaded CSV: the header row plus every data row, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    /// Column names from the first record.
    pub headers: Vec<String>,
    /// Each data record as a Vec of Strings, same length as `headers`.
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Position of the first column whose name equals `name`, ignoring case.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| fold_eq(h, name))
    }
}

/// Case-insensitive equality that also folds non-ASCII letters.
pub fn fold_eq(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b) || a.to_lowercase() == b.to_lowercase()
}
