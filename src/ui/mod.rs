//! Terminal output for the `fcircle-db` binary

pub mod icons;
pub mod output;
pub mod table;

pub use icons::Icons;
pub use output::{Palette, dim, error, header, palette, section, status, success, table_line, warn};
pub use table::TableBuilder;
