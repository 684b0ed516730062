use duckdb::Connection;
use std::fs;
use std::path::{Path, PathBuf};

/// A hive-partitioned Parquet dataset of signal snapshots.
///
/// Storage layout:
/// ```text
/// data/signals/run_date=2024-05-01/data_0.parquet
/// ```
pub struct ParquetDataset {
    base_dir: PathBuf,
}

impl ParquetDataset {
    pub fn new(base_dir: &Path) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
        }
    }

    /// Returns the partition directory for a given run date.
    pub fn partition_dir(&self, run_date: &str) -> PathBuf {
        self.base_dir.join(format!("run_date={run_date}"))
    }

    /// Glob matching every Parquet file of every partition.
    pub fn glob_pattern(&self) -> String {
        format!("{}/run_date=*/*.parquet", self.base_dir.to_string_lossy())
    }

    /// Run dates with a partition directory on disk, ascending.
    pub fn partition_dates(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.base_dir) else {
            return Vec::new();
        };
        let mut dates: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|e| e.path().is_dir())
            .filter_map(|e| {
                e.file_name()
                    .to_str()
                    .and_then(|name| name.strip_prefix("run_date="))
                    .map(str::to_string)
            })
            .collect();
        dates.sort();
        dates
    }

    /// Expose the dataset as `table_id`. Returns the number of partitions.
    ///
    /// With no partitions on disk an empty signals table is created instead,
    /// since `read_parquet` refuses an empty glob.
    pub fn attach(&self, conn: &Connection, table_id: &str) -> Result<usize, duckdb::Error> {
        let partitions = self.partition_dates().len();
        if partitions == 0 {
            tracing::warn!(
                dir = %self.base_dir.display(),
                "No signal partitions found; serving an empty table"
            );
            crate::storage::schema::init_schema(conn, table_id)?;
            return Ok(0);
        }

        // Note: table functions do not accept bound parameters in a view body.
        // The glob comes from local configuration, not from requests.
        let pattern = self.glob_pattern().replace('\'', "''");
        conn.execute_batch(&format!(
            "CREATE OR REPLACE VIEW {table_id} AS SELECT * FROM read_parquet('{pattern}', hive_partitioning = true, hive_types = {{'run_date': DATE}})"
        ))?;
        Ok(partitions)
    }

    /// Write every row of `source_table_id` into the dataset, one partition
    /// per run date.
    pub fn export(&self, conn: &Connection, source_table_id: &str) -> Result<(), ExportError> {
        fs::create_dir_all(&self.base_dir).map_err(ExportError::CreateDir)?;
        let dir = self.base_dir.to_string_lossy().replace('\'', "''");
        conn.execute_batch(&format!(
            "COPY (SELECT * FROM {source_table_id}) TO '{dir}' (FORMAT PARQUET, COMPRESSION ZSTD, PARTITION_BY (run_date), OVERWRITE_OR_IGNORE)"
        ))
        .map_err(ExportError::Write)
    }
}

#[derive(Debug)]
pub enum ExportError {
    CreateDir(std::io::Error),
    Write(duckdb::Error),
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateDir(e) => write!(f, "Create directory error: {e}"),
            Self::Write(e) => write!(f, "Write error: {e}"),
        }
    }
}

impl std::error::Error for ExportError {}
