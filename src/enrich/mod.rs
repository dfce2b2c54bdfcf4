// src/enrich/mod.rs
use std::{io::Write, time::Duration};

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    error::{EnrichError, Result, StoreError},
    store::CountStore,
    table::{self, fold_eq, Table, TableWriter},
};

pub const TYPE_COLUMN: &str = "type";
pub const ADDRESS_COLUMN: &str = "address";
/// Name of the column appended to the output header.
pub const COUNT_COLUMN: &str = "count";

/// Header positions of the columns the pipeline reads, resolved once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Columns {
    pub type_idx: usize,
    pub address_idx: usize,
}

impl Columns {
    pub fn resolve(table: &Table) -> Result<Self> {
        let find = |name: &str| {
            table
                .column_index(name)
                .ok_or_else(|| EnrichError::schema(name))
        };
        Ok(Self {
            type_idx: find(TYPE_COLUMN)?,
            address_idx: find(ADDRESS_COLUMN)?,
        })
    }
}

/// Row tallies for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Data rows in the input (header excluded).
    pub rows_read: u64,
    pub rows_written: u64,
    /// Rows dropped by the type filter.
    pub rows_skipped: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Read `config.input_path`, enrich every matching row with its document
/// count and write the result to `config.output_path`.
///
/// The header is validated before the output file is created, so a schema
/// error leaves nothing on disk. A failed query aborts the run; rows written
/// before it are flushed and left in place.
#[tracing::instrument(level = "info", skip_all, fields(input = %config.input_path.display(), output = %config.output_path.display()))]
pub async fn run<S: CountStore>(config: &Config, store: &S) -> Result<RunSummary> {
    let started_at = Utc::now();

    let table = table::read_path(&config.input_path)?;
    info!(
        columns = table.headers.len(),
        rows = table.rows.len(),
        "loaded input"
    );
    let columns = Columns::resolve(&table)?;

    let mut writer = TableWriter::create(&config.output_path)?;
    let tally = match enrich_table(
        table,
        columns,
        &config.type_filter_value,
        config.store.query_timeout,
        store,
        &mut writer,
    )
    .await
    {
        Ok(tally) => tally,
        Err(e) => {
            if let Err(flush_err) = writer.flush() {
                warn!(error = %flush_err, "flushing partial output failed");
            }
            return Err(e);
        }
    };
    writer.finish()?;

    let summary = RunSummary {
        rows_read: tally.read,
        rows_written: tally.written,
        rows_skipped: tally.read - tally.written,
        started_at,
        finished_at: Utc::now(),
    };
    info!(
        rows_read = summary.rows_read,
        rows_written = summary.rows_written,
        rows_skipped = summary.rows_skipped,
        duration_ms = (summary.finished_at - summary.started_at).num_milliseconds(),
        "processing complete; results written to {}",
        config.output_path.display()
    );
    Ok(summary)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Tally {
    pub(crate) read: u64,
    pub(crate) written: u64,
}

/// Write `table`'s header plus `count`, then each row whose type matches
/// `type_filter`, with the store's count for its lowercased address appended.
/// A query still pending after `query_timeout` fails with [`StoreError::Timeout`].
pub(crate) async fn enrich_table<S: CountStore, W: Write>(
    table: Table,
    columns: Columns,
    type_filter: &str,
    query_timeout: Option<Duration>,
    store: &S,
    writer: &mut TableWriter<W>,
) -> Result<Tally> {
    let Table { mut headers, rows } = table;
    headers.push(COUNT_COLUMN.to_string());
    writer.write_header(&headers)?;

    let mut tally = Tally::default();
    for (index, mut row) in rows.into_iter().enumerate() {
        tally.read += 1;

        if !fold_eq(&row[columns.type_idx], type_filter) {
            debug!(row = index, kind = %row[columns.type_idx], "skipped");
            continue;
        }

        let start = Instant::now();
        let address = row[columns.address_idx].clone();
        let key = address.to_lowercase();
        let query = store.count(&key);
        let outcome = match query_timeout {
            Some(limit) => tokio::time::timeout(limit, query)
                .await
                .unwrap_or(Err(StoreError::Timeout(limit))),
            None => query.await,
        };
        let count = outcome.map_err(|source| EnrichError::Query {
            address: key.clone(),
            source,
        })?;
        info!(row = index, address = %address, count, elapsed = ?start.elapsed(), "processed row");

        row.push(count.to_string());
        writer.write_row(&row)?;
        tally.written += 1;
    }

    Ok(tally)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::store::memory::MemoryStore;
    use std::{fs, io::Cursor, path::Path};
    use tempfile::{tempdir, TempDir};
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    fn init_test_logging() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,addrcount::enrich=debug")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    fn parse(text: &str) -> Table {
        table::read_all(Cursor::new(text.as_bytes()), Path::new("mem.csv")).unwrap()
    }

    async fn enrich_to_string(text: &str, store: &MemoryStore) -> Result<String> {
        let table = parse(text);
        let columns = Columns::resolve(&table)?;
        let mut writer = TableWriter::from_writer(Vec::new(), "mem.csv");
        enrich_table(table, columns, "NFT_COLLECTION", None, store, &mut writer).await?;
        let bytes = writer.finish()?;
        Ok(String::from_utf8(bytes).unwrap())
    }

    fn config_in(dir: &TempDir, input: &str) -> Config {
        let input_path = dir.path().join("input.csv");
        fs::write(&input_path, input).unwrap();
        Config {
            store: StoreConfig {
                endpoint: "mongodb://unused".into(),
                database: "db".into(),
                collection: "coll".into(),
                query_timeout: None,
            },
            input_path,
            output_path: dir.path().join("output.csv"),
            type_filter_value: "NFT_COLLECTION".into(),
        }
    }

    #[tokio::test]
    async fn appends_count_and_drops_other_types() -> anyhow::Result<()> {
        init_test_logging();
        let store = MemoryStore::with_counts(&[("0xaaa", 5)]);
        let out = enrich_to_string("type,address\nNFT_COLLECTION,0xAAA\nOTHER,0xBBB\n", &store).await?;
        assert_eq!(out, "type,address,count\nNFT_COLLECTION,0xAAA,5\n");
        assert_eq!(store.queried(), vec!["0xaaa"]);
        Ok(())
    }

    #[tokio::test]
    async fn type_filter_ignores_case_but_is_exact() -> anyhow::Result<()> {
        init_test_logging();
        let store = MemoryStore::with_counts(&[("0x1", 1), ("0x2", 2), ("0x3", 3), ("0x4", 4)]);
        let input = "address,type\n\
                     0x1,nft_collection\n\
                     0x2,NFT_COLLECTION\n\
                     0x3,Nft_Collection\n\
                     0x4,NFT_COLLECTIONX\n";
        let out = enrich_to_string(input, &store).await?;
        assert_eq!(
            out,
            "address,type,count\n0x1,nft_collection,1\n0x2,NFT_COLLECTION,2\n0x3,Nft_Collection,3\n"
        );
        assert_eq!(store.queried(), vec!["0x1", "0x2", "0x3"]);
        Ok(())
    }

    #[tokio::test]
    async fn address_is_lowercased_for_lookup_only() -> anyhow::Result<()> {
        let store = MemoryStore::with_counts(&[("0xabc", 7)]);
        let out = enrich_to_string("Type,ADDRESS\nNFT_COLLECTION,0xABC\n", &store).await?;
        assert_eq!(store.queried(), vec!["0xabc"]);
        // row keeps the original spelling
        assert_eq!(out, "Type,ADDRESS,count\nNFT_COLLECTION,0xABC,7\n");
        Ok(())
    }

    #[tokio::test]
    async fn output_rows_match_header_width_and_order() -> anyhow::Result<()> {
        let store = MemoryStore::with_counts(&[("0xc", 12)]);
        let input = "name,type,address,chain\n\
                     c,NFT_COLLECTION,0xC,eth\n\
                     a,TOKEN,0xA,eth\n\
                     b,NFT_COLLECTION,0xB,poly\n";
        let out = enrich_to_string(input, &store).await?;
        let written = parse(&out);
        assert_eq!(written.headers, vec!["name", "type", "address", "chain", "count"]);
        assert!(written.rows.iter().all(|r| r.len() == written.headers.len()));
        let names: Vec<&str> = written.rows.iter().map(|r| r[0].as_str()).collect();
        assert_eq!(names, vec!["c", "b"]);
        assert_eq!(written.rows[0][4], "12");
        // unknown address counts as zero in the memory store
        assert_eq!(written.rows[1][4], "0");
        Ok(())
    }

    #[tokio::test]
    async fn header_only_input_writes_header() -> anyhow::Result<()> {
        let store = MemoryStore::default();
        let out = enrich_to_string("type,address\n", &store).await?;
        assert_eq!(out, "type,address,count\n");
        assert!(store.queried().is_empty());
        Ok(())
    }

    #[test]
    fn missing_column_names_it() {
        let err = Columns::resolve(&parse("type,addr\nNFT_COLLECTION,0x1\n")).unwrap_err();
        assert!(matches!(err, EnrichError::Schema { ref column } if column == "address"));

        let err = Columns::resolve(&parse("kind,address\nNFT_COLLECTION,0x1\n")).unwrap_err();
        assert!(matches!(err, EnrichError::Schema { ref column } if column == "type"));
    }

    #[tokio::test]
    async fn run_writes_output_file_and_summary() -> anyhow::Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let config = config_in(&dir, "type,address\nNFT_COLLECTION,0xAAA\nOTHER,0xBBB\n");
        let store = MemoryStore::with_counts(&[("0xaaa", 5)]);

        let summary = run(&config, &store).await?;
        assert_eq!(summary.rows_read, 2);
        assert_eq!(summary.rows_written, 1);
        assert_eq!(summary.rows_skipped, 1);
        assert!(summary.finished_at >= summary.started_at);
        assert_eq!(
            fs::read_to_string(&config.output_path)?,
            "type,address,count\nNFT_COLLECTION,0xAAA,5\n"
        );
        Ok(())
    }

    #[tokio::test]
    async fn run_is_idempotent() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let config = config_in(
            &dir,
            "type,address,label\nNFT_COLLECTION,0xA,\"x, y\"\nNFT_COLLECTION,0xB,z\n",
        );
        let store = MemoryStore::with_counts(&[("0xa", 3), ("0xb", 9)]);

        run(&config, &store).await?;
        let first = fs::read(&config.output_path)?;
        run(&config, &store).await?;
        let second = fs::read(&config.output_path)?;
        assert_eq!(first, second);
        Ok(())
    }

    #[tokio::test]
    async fn schema_error_creates_no_output() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let config = config_in(&dir, "type,wallet\nNFT_COLLECTION,0xAAA\n");
        let store = MemoryStore::default();

        let err = run(&config, &store).await.unwrap_err();
        assert!(matches!(err, EnrichError::Schema { .. }));
        assert!(err.to_string().contains("address"));
        assert!(!config.output_path.exists());
        assert!(store.queried().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn query_failure_aborts_remaining_rows() -> anyhow::Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let config = config_in(
            &dir,
            "type,address\nNFT_COLLECTION,0x1\nNFT_COLLECTION,0x2\nNFT_COLLECTION,0x3\n",
        );
        let store = MemoryStore::with_counts(&[("0x1", 1)]).failing_on("0x2");

        let err = run(&config, &store).await.unwrap_err();
        assert!(matches!(err, EnrichError::Query { ref address, .. } if address == "0x2"));
        assert_eq!(err.exit_code(), 6);
        assert_eq!(store.queried(), vec!["0x1", "0x2"]);
        // rows before the failure were flushed
        assert_eq!(
            fs::read_to_string(&config.output_path)?,
            "type,address,count\nNFT_COLLECTION,0x1,1\n"
        );
        Ok(())
    }

    #[tokio::test]
    async fn custom_type_filter_is_honored() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let mut config = config_in(&dir, "type,address\nNFT_COLLECTION,0x1\ntoken,0x2\n");
        config.type_filter_value = "TOKEN".into();
        let store = MemoryStore::with_counts(&[("0x2", 4)]);

        run(&config, &store).await?;
        assert_eq!(
            fs::read_to_string(&config.output_path)?,
            "type,address,count\ntoken,0x2,4\n"
        );
        Ok(())
    }

    #[tokio::test]
    async fn missing_input_is_an_input_error() {
        let dir = tempdir().unwrap();
        let mut config = config_in(&dir, "");
        config.input_path = dir.path().join("absent.csv");
        let err = run(&config, &MemoryStore::default()).await.unwrap_err();
        assert!(matches!(err, EnrichError::Input { .. }));
        assert!(!config.output_path.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_query_times_out_and_stops_the_run() -> anyhow::Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let mut config = config_in(
            &dir,
            "type,address\nNFT_COLLECTION,0x1\nNFT_COLLECTION,0x2\nNFT_COLLECTION,0x3\n",
        );
        config.store.query_timeout = Some(Duration::from_secs(5));
        let store = MemoryStore::with_counts(&[("0x1", 1), ("0x2", 2), ("0x3", 3)])
            .slow_on("0x2", Duration::from_secs(60));

        let err = run(&config, &store).await.unwrap_err();
        assert!(matches!(
            err,
            EnrichError::Query {
                ref address,
                source: StoreError::Timeout(limit),
            } if address == "0x2" && limit == Duration::from_secs(5)
        ));
        assert_eq!(err.exit_code(), 6);
        assert_eq!(store.queried(), vec!["0x1", "0x2"]);
        assert_eq!(
            fs::read_to_string(&config.output_path)?,
            "type,address,count\nNFT_COLLECTION,0x1,1\n"
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn query_within_timeout_succeeds() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let mut config = config_in(&dir, "type,address\nNFT_COLLECTION,0xAAA\n");
        config.store.query_timeout = Some(Duration::from_secs(5));
        let store = MemoryStore::with_counts(&[("0xaaa", 5)]).slow_on("0xaaa", Duration::from_secs(2));

        let summary = run(&config, &store).await?;
        assert_eq!(summary.rows_written, 1);
        assert_eq!(
            fs::read_to_string(&config.output_path)?,
            "type,address,count\nNFT_COLLECTION,0xAAA,5\n"
        );
        Ok(())
    }
}
