//! Runtime configuration: home directory, pool selection and on-disk layout.

pub mod constants;
pub mod layout;
pub mod options;
