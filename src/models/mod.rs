pub mod issue;
pub mod report;
pub mod repository;

pub use issue::*;
pub use report::*;
pub use repository::*;

use serde::{Deserialize, Deserializer};

/// GitHub sends `null` for empty free-text fields; treat it as an empty string.
pub(crate) fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
