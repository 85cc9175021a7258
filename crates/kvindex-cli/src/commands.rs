use crate::{
    cli::{Cli, Command, IndexArgs, RecordArgs},
    config::CliConfig,
    error::CliError,
    record::{self, LoadRecord},
};
use kvindex_core::{
    binding::{RecordBinding, Schema},
    key::{CompositeKey, parse_path},
    metadata::IndexState,
    obs::metrics_report,
    store::{KvStore, MemoryStore, ScanOrder},
    view::IndexViewEngine,
};
use serde_json::{Value, json};
use std::{collections::BTreeMap, path::Path};
use tracing::{debug, info};

type Engine = IndexViewEngine<MemoryStore>;

/// Run one command against the store file; returns the operation's verdict.
pub fn run(cli: Cli) -> Result<bool, CliError> {
    let config = CliConfig::load(cli.config.as_deref())?;
    let store = MemoryStore::load_from(&cli.store)?;
    debug!(path = %cli.store.display(), records = store.len(), "store loaded");

    let binding = RecordBinding::new(config.registry());
    let engine = IndexViewEngine::new(store, binding, config.engine)?;
    let writes = cli.command.writes();

    let verdict = dispatch(&engine, cli.command)?;

    if writes {
        engine.store().save_to(&cli.store)?;
        info!(path = %cli.store.display(), "store saved");
    }

    Ok(verdict)
}

fn dispatch(engine: &Engine, command: Command) -> Result<bool, CliError> {
    match command {
        Command::Load { file } => load(engine, file.as_deref()),
        Command::BuildIndex(args) => {
            report("build-index", engine.build_index(&args.fields, &args.schema)?)
        }
        Command::DropIndex(args) => {
            report("drop-index", engine.drop_index(&args.fields, &args.schema)?)
        }
        Command::RebuildIndex(args) => {
            report("rebuild-index", engine.rebuild_index(&args.fields, &args.schema)?)
        }
        Command::CheckIndex(args) => check_index(engine, &args),
        Command::Insert(args) => {
            let (key, value) = encode_record(engine, &args)?;
            report("insert", engine.insert_record(&key, &value)?)
        }
        Command::Update(args) => {
            let (key, value) = encode_record(engine, &args)?;
            report("update", engine.update_record(&key, &value)?)
        }
        Command::Delete { key } => report("delete", engine.delete_record(&parse_path(&key)?)?),
        Command::Query {
            schema,
            fields,
            values,
        } => query(engine, &schema, &fields, &values),
        Command::ListIndexes => {
            for meta in engine.list_indexes()? {
                print_json(&json!({
                    "name": meta.name,
                    "schema": meta.schema,
                    "fields": meta.fields,
                    "state": meta.state.as_str(),
                }));
            }
            Ok(true)
        }
        Command::Show {
            prefix,
            index,
            schema,
        } => show(engine, prefix.as_deref(), index.as_deref(), schema.as_deref()),
        Command::Stats => stats(engine),
    }
}

fn report(op: &str, ok: bool) -> Result<bool, CliError> {
    print_json(&json!({ "op": op, "ok": ok }));

    Ok(ok)
}

fn print_json(value: &Value) {
    println!("{value}");
}

fn schema<'a>(engine: &'a Engine, name: &str) -> Result<&'a Schema, CliError> {
    engine
        .binding()
        .registry()
        .get(name)
        .ok_or_else(|| CliError::UnknownSchema(name.to_string()))
}

fn encode_record(
    engine: &Engine,
    args: &RecordArgs,
) -> Result<(CompositeKey, Vec<u8>), CliError> {
    let key = parse_path(&args.key)?;
    let fields = record::fields_from_json(schema(engine, &args.schema)?, &args.json)?;
    let value = engine.binding().encode(&args.schema, &fields)?;

    Ok((key, value))
}

fn load(engine: &Engine, file: Option<&Path>) -> Result<bool, CliError> {
    let records: Vec<LoadRecord> = match file {
        Some(path) => {
            let source = std::fs::read_to_string(path).map_err(|source| CliError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            serde_json::from_str(&source)?
        }
        None => record::sample_people(),
    };

    let mut inserted = 0u64;
    let mut declined = 0u64;
    for item in &records {
        let key = parse_path(&item.key)?;
        let fields = record::fields_from_object(schema(engine, &item.schema)?, &item.fields)?;
        let value = engine.binding().encode(&item.schema, &fields)?;

        if engine.insert_record(&key, &value)? {
            inserted += 1;
        } else {
            declined += 1;
        }
    }

    print_json(&json!({ "op": "load", "inserted": inserted, "declined": declined }));

    Ok(declined == 0)
}

fn check_index(engine: &Engine, args: &IndexArgs) -> Result<bool, CliError> {
    let Some(report) = engine.check_index(&args.fields, &args.schema)? else {
        print_json(&json!({ "op": "check-index", "ok": false, "reason": "no ready index" }));
        return Ok(false);
    };

    let paths = |keys: &[CompositeKey]| -> Vec<String> {
        keys.iter().map(CompositeKey::to_path_string).collect()
    };
    print_json(&json!({
        "op": "check-index",
        "ok": report.is_consistent(),
        "index": report.index,
        "scanned": report.scanned,
        "entries": report.entries,
        "missing": paths(&report.missing),
        "dangling": paths(&report.dangling),
        "stale": paths(&report.stale),
    }));

    Ok(report.is_consistent())
}

fn query(
    engine: &Engine,
    schema_name: &str,
    fields: &[String],
    literals: &[String],
) -> Result<bool, CliError> {
    let values = record::parse_literals(schema(engine, schema_name)?, fields, literals)?;

    let Some(result) = engine.lookup(fields, &values, schema_name)? else {
        print_json(&json!({
            "op": "query",
            "ok": false,
            "reason": "no ready index serves these fields",
        }));
        return Ok(false);
    };

    for (key, hit) in &result {
        let record = engine
            .binding()
            .decode(&hit.value)?
            .map_or(Value::Null, |decoded| record::fields_to_json(&decoded.fields));

        print_json(&json!({
            "key": key.to_path_string(),
            "version": hit.version.0,
            "index": hit.index,
            "record": record,
        }));
    }

    Ok(true)
}

fn show(
    engine: &Engine,
    prefix: Option<&str>,
    index_fields: Option<&[String]>,
    schema_name: Option<&str>,
) -> Result<bool, CliError> {
    let config = engine.config();

    let root = match (index_fields, schema_name) {
        (Some(fields), Some(schema_name)) => {
            let Some(meta) = engine.metadata().find_exact(schema_name, fields)? else {
                return Err(CliError::Usage(format!(
                    "no index on {fields:?} of schema '{schema_name}'"
                )));
            };
            CompositeKey::from_major([config.index_prefix.as_str(), meta.name.as_str()])
        }
        _ => prefix.map(parse_path).transpose()?.unwrap_or_default(),
    };

    let scan = engine
        .store()
        .scan_entries(&root, ScanOrder::Forward, &config.request)?;
    for entry in scan {
        let entry = entry?;
        let reserved = entry
            .key
            .root()
            .is_some_and(|root| config.is_reserved_root(root));
        if reserved && index_fields.is_none() {
            continue;
        }

        // Index and metadata records are key-only.
        let value = match engine.binding().decode(&entry.value) {
            _ if reserved => Value::Null,
            Ok(Some(decoded)) => json!({
                "schema": decoded.schema,
                "fields": record::fields_to_json(&decoded.fields),
            }),
            Ok(None) => json!({ "raw_bytes": entry.value.len() }),
            Err(err) => json!({ "error": err.to_string() }),
        };

        print_json(&json!({
            "key": entry.key.to_path_string(),
            "version": entry.version.0,
            "value": value,
        }));
    }

    Ok(true)
}

fn stats(engine: &Engine) -> Result<bool, CliError> {
    let config = engine.config();
    let mut records = 0u64;
    let mut entries = BTreeMap::<String, u64>::new();

    for entry in engine.store().entries()? {
        match entry.key.root() {
            Some(root) if root == config.index_prefix => {
                if let Some(index) = entry.key.major().get(1) {
                    *entries.entry(index.clone()).or_default() += 1;
                }
            }
            Some(root) if root == config.metadata_prefix => {}
            _ => records += 1,
        }
    }

    let indexes: Vec<Value> = engine
        .list_indexes()?
        .into_iter()
        .map(|meta| {
            json!({
                "name": meta.name,
                "schema": meta.schema,
                "fields": meta.fields,
                "state": meta.state.as_str(),
                "usable": meta.state == IndexState::Ready,
                "entries": entries.get(&meta.name).copied().unwrap_or(0),
            })
        })
        .collect();

    print_json(&json!({
        "records": records,
        "indexes": indexes,
        "events": metrics_report(),
    }));

    Ok(true)
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::PathBuf;

    fn store_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("kvindex-cli-{name}-{}.store", std::process::id()))
    }

    fn run_args(store: &Path, args: &[&str]) -> Result<bool, CliError> {
        let store = store.to_string_lossy();
        let argv = ["kvindex", "--store", store.as_ref()]
            .into_iter()
            .chain(args.iter().copied());

        run(Cli::try_parse_from(argv).expect("parse"))
    }

    #[test]
    fn load_build_and_query_round_trip_through_the_store_file() {
        let path = store_path("round-trip");
        let _ = std::fs::remove_file(&path);

        assert!(run_args(&path, &["load"]).expect("load"));
        assert!(
            run_args(&path, &["build-index", "--schema", "Person", "--fields", "lastName"])
                .expect("build")
        );
        assert!(
            run_args(
                &path,
                &["query", "--schema", "Person", "--fields", "lastName", "--values", "Jameson"],
            )
            .expect("query")
        );
        assert!(
            !run_args(
                &path,
                &["query", "--schema", "Person", "--fields", "city", "--values", "Oslo"],
            )
            .expect("unindexed query")
        );
        assert!(run_args(&path, &["show"]).expect("show"));
        assert!(run_args(&path, &["stats"]).expect("stats"));

        // Reopen the saved file and confirm the index was persisted.
        let config = CliConfig::load(None).expect("config");
        let engine = IndexViewEngine::new(
            MemoryStore::load_from(&path).expect("reload"),
            RecordBinding::new(config.registry()),
            config.engine,
        )
        .expect("engine");
        let _ = std::fs::remove_file(&path);

        let hits = engine
            .lookup(
                &["lastName".to_string()],
                &[kvindex_core::binding::FieldValue::from("Jameson")],
                "Person",
            )
            .expect("lookup")
            .expect("ready");
        let keys: Vec<String> = hits.keys().map(CompositeKey::to_path_string).collect();
        assert_eq!(keys, vec!["/Person/1".to_string(), "/Person/2".to_string()]);
    }

    #[test]
    fn loading_twice_declines_existing_records() {
        let path = store_path("reload");
        let _ = std::fs::remove_file(&path);

        assert!(run_args(&path, &["load"]).expect("first load"));
        assert!(!run_args(&path, &["load"]).expect("second load"));
        let _ = std::fs::remove_file(&path);
    }
}
