pub mod format;
pub mod row;
pub mod sort;
