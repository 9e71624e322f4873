// deltrack-common: record types, table codec and path layout shared by the tracker crates

pub mod layout;
pub mod table;
pub mod types;
