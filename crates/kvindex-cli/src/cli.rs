use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

///
/// Cli
///

#[derive(Debug, Parser)]
#[command(name = "kvindex", version, about = "Secondary index views over a key-value store")]
pub struct Cli {
    /// Store snapshot file; created on first write.
    #[arg(long, env = "KVINDEX_STORE", default_value = "kvindex.store", global = true)]
    pub store: PathBuf,

    /// TOML config with an `[engine]` table and `[[schemas]]` entries.
    #[arg(long, env = "KVINDEX_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

///
/// Command
///

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Insert records from a JSON file, or the built-in sample people.
    Load {
        /// JSON array of `{ "key", "schema", "fields" }` objects.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Declare an index and populate it from the primary records.
    BuildIndex(IndexArgs),

    /// Remove a ready index (or resume an interrupted drop).
    DropIndex(IndexArgs),

    /// Drop the index if present, then build it.
    RebuildIndex(IndexArgs),

    /// Compare an index with the primary records.
    CheckIndex(IndexArgs),

    /// Insert a new record and index it.
    Insert(RecordArgs),

    /// Overwrite a record, moving its index entries.
    Update(RecordArgs),

    /// Delete a record and its index entries.
    Delete {
        /// Primary key path, e.g. `/Person/1`.
        #[arg(long)]
        key: String,
    },

    /// Look records up by field values.
    Query {
        #[arg(long)]
        schema: String,

        /// Comma-separated field names, in index order.
        #[arg(long, value_delimiter = ',', required = true)]
        fields: Vec<String>,

        /// Comma-separated literals, one per field.
        #[arg(long, value_delimiter = ',', required = true)]
        values: Vec<String>,
    },

    /// List declared indexes and their states.
    ListIndexes,

    /// Dump primary records, or the entries of one index.
    Show {
        /// Only keys under this path.
        #[arg(long)]
        prefix: Option<String>,

        /// Show entries of the index on these fields instead of records.
        #[arg(long, value_delimiter = ',', requires = "schema")]
        index: Option<Vec<String>>,

        #[arg(long)]
        schema: Option<String>,
    },

    /// Store summary and this run's event counters.
    Stats,
}

///
/// IndexArgs
///

#[derive(Args, Debug)]
pub struct IndexArgs {
    #[arg(long)]
    pub schema: String,

    /// Comma-separated field names, in index order.
    #[arg(long, value_delimiter = ',', required = true)]
    pub fields: Vec<String>,
}

///
/// RecordArgs
///

#[derive(Args, Debug)]
pub struct RecordArgs {
    /// Primary key path, e.g. `/Person/1`.
    #[arg(long)]
    pub key: String,

    #[arg(long)]
    pub schema: String,

    /// Field values as a JSON object.
    #[arg(long)]
    pub json: String,
}

impl Command {
    /// Whether the command may change the store.
    pub const fn writes(&self) -> bool {
        !matches!(
            self,
            Self::CheckIndex(_)
                | Self::Query { .. }
                | Self::ListIndexes
                | Self::Show { .. }
                | Self::Stats
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn field_lists_split_on_commas() {
        let cli = Cli::try_parse_from([
            "kvindex",
            "build-index",
            "--schema",
            "Person",
            "--fields",
            "lastName,firstName",
        ])
        .expect("parse");

        assert!(cli.command.writes());
        let Command::BuildIndex(args) = cli.command else {
            panic!("expected build-index");
        };
        assert_eq!(args.fields, ["lastName", "firstName"]);
    }

    #[test]
    fn read_only_commands_do_not_write() {
        let cli = Cli::try_parse_from(["kvindex", "list-indexes"]).expect("parse");
        assert!(!cli.command.writes());
    }
}
