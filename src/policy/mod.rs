pub mod profile;

pub use profile::{EditContext, FieldAccess, ProfileField};
