//! redb table definitions for the Switchyard state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain
//! types). Attempt keys are `{application}/{environment}:{attempt:08}`;
//! release keys are `{application}/{environment}`.

use redb::TableDefinition;

/// Deployment attempt records keyed by `{application}/{environment}:{attempt:08}`.
pub const ATTEMPTS: TableDefinition<&str, &[u8]> = TableDefinition::new("attempts");

/// Live releases keyed by `{application}/{environment}`.
pub const RELEASES: TableDefinition<&str, &[u8]> = TableDefinition::new("releases");
