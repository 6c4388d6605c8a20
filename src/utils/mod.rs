pub mod error;
pub mod progress;
pub mod sql;
pub mod string_ext;

pub use error::{DossierError, DossierResult};
pub use progress::{DatabaseProgress, ProgressReporter};
pub use sql::{escape_literal, quote_ident};
pub use string_ext::{clean_optional_string, strip_react_scaffolding, StringExt};
