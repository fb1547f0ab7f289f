//! Redb table definitions for the metadata store (spec §4.4).

use redb::TableDefinition;

/// `api_path -> bincode(MetaRow)`.
pub const META: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

/// `source_path -> api_path`, a secondary index redb has no built-in support
/// for (spec §8's "metadata linkage" needs `get_api_path` by source_path).
pub const SOURCE_PATH_INDEX: TableDefinition<&str, &str> =
    TableDefinition::new("source_path_index");
