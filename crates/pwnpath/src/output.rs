//! Output formats.

pub(crate) mod json;
pub(crate) mod plain;
