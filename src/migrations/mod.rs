//! Versioned graph migrations
//!
//! Migrations are `.cypher` files named `<YYYYMMDD>_<n>[_label].cypher`.
//! Each one runs exactly once, in (date, increment) order. Its data
//! statements share a single transaction with the `:Migration` node that
//! records it. Two uniqueness constraints on that node make concurrent
//! runners race safely: the loser's transaction fails and rolls back.
//!
//! Neo4j refuses data writes in a transaction that changed the schema, so
//! `CREATE|DROP INDEX|CONSTRAINT` statements run on their own, before that
//! transaction. They must carry `IF NOT EXISTS` / `IF EXISTS` so a migration
//! that failed after its schema step can be rerun.

use crate::error::{CoreError, CoreResult};
use crate::neo4j::{QueryExecutor, QueryObject};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use walkdir::WalkDir;

/// `<date>_<increment>`; ordered by date string, then increment as a number
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MigrationId {
    pub date: String,
    pub increment: u32,
}

impl MigrationId {
    pub fn new(date: impl Into<String>, increment: u32) -> Self {
        Self {
            date: date.into(),
            increment,
        }
    }

    /// Parse a file stem, returning the id and optional label
    fn parse_stem(stem: &str) -> Option<(Self, Option<String>)> {
        let mut parts = stem.splitn(3, '_');
        let date = parts.next().filter(|d| d.len() == 8 && all_digits(d))?;
        let increment = parts.next().filter(|i| all_digits(i))?.parse().ok()?;
        let label = match parts.next() {
            None => None,
            Some(label) if !label.is_empty() => Some(label.to_string()),
            Some(_) => return None,
        };
        Some((Self::new(date, increment), label))
    }
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

impl Ord for MigrationId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.date
            .cmp(&other.date)
            .then(self.increment.cmp(&other.increment))
    }
}

impl PartialOrd for MigrationId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for MigrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.date, self.increment)
    }
}

impl FromStr for MigrationId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Self::parse_stem(s) {
            Some((id, None)) => Ok(id),
            _ => Err(CoreError::InvalidMigration(format!(
                "'{}' is not a <YYYYMMDD>_<n> version",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Migration {
    pub id: MigrationId,
    pub name: String,
    pub statements: Vec<String>,
}

impl Migration {
    /// Build from raw Cypher, splitting on `;`
    pub fn new(id: MigrationId, name: impl Into<String>, cypher: &str) -> Self {
        Self {
            id,
            name: name.into(),
            statements: split_statements(cypher),
        }
    }

    /// Schema statements and data statements, each in script order
    fn partition(&self) -> CoreResult<(Vec<&str>, Vec<&str>)> {
        let (schema, data): (Vec<&str>, Vec<&str>) = self
            .statements
            .iter()
            .map(String::as_str)
            .partition(|s| is_schema_statement(s));
        if let Some(unguarded) = schema.iter().find(|s| !is_guarded(s)) {
            return Err(CoreError::InvalidMigration(format!(
                "{}: schema statement must use IF [NOT] EXISTS: {}",
                self.id, unguarded
            )));
        }
        Ok((schema, data))
    }
}

/// `CREATE|DROP [RANGE|TEXT|...] INDEX` and `CREATE|DROP CONSTRAINT`
pub fn is_schema_statement(statement: &str) -> bool {
    let mut words = statement.split_whitespace().map(str::to_ascii_uppercase);
    if !matches!(words.next().as_deref(), Some("CREATE" | "DROP")) {
        return false;
    }
    match words.next().as_deref() {
        Some("INDEX" | "CONSTRAINT") => true,
        Some("RANGE" | "TEXT" | "POINT" | "LOOKUP" | "FULLTEXT" | "VECTOR") => {
            words.next().as_deref() == Some("INDEX")
        }
        _ => false,
    }
}

fn is_guarded(statement: &str) -> bool {
    let words: Vec<String> = statement
        .split_whitespace()
        .map(str::to_ascii_uppercase)
        .collect();
    words
        .windows(3)
        .any(|w| w[0] == "IF" && w[1] == "NOT" && w[2] == "EXISTS")
        || words.windows(2).any(|w| w[0] == "IF" && w[1] == "EXISTS")
}

/// Split a script into statements; `//` comment lines and blanks are dropped
pub fn split_statements(cypher: &str) -> Vec<String> {
    let without_comments: String = cypher
        .lines()
        .filter(|line| !line.trim_start().starts_with("//"))
        .collect::<Vec<_>>()
        .join("\n");
    without_comments
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Load every migration file under `dir`, sorted by id.
///
/// Files that do not follow the naming scheme are skipped with a warning;
/// two files sharing one id are an error.
pub fn discover(dir: &Path) -> CoreResult<Vec<Migration>> {
    if !dir.exists() {
        tracing::warn!("Migrations directory {} does not exist", dir.display());
        return Ok(Vec::new());
    }

    let mut migrations = Vec::new();
    let mut seen = HashSet::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| anyhow::anyhow!("Failed to read {}: {}", dir.display(), e))?;
        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().and_then(|e| e.to_str()) != Some("cypher")
        {
            continue;
        }
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        let Some((id, label)) = MigrationId::parse_stem(stem) else {
            tracing::warn!("Skipping migration file with unexpected name: {}", path.display());
            continue;
        };
        if !seen.insert(id.clone()) {
            return Err(CoreError::InvalidMigration(format!(
                "duplicate migration version {} ({})",
                id,
                path.display()
            )));
        }

        let cypher = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        migrations.push(Migration::new(id, label.unwrap_or_else(|| stem.to_string()), &cypher));
    }

    migrations.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(migrations)
}

const CONSTRAINTS: [&str; 2] = [
    "CREATE CONSTRAINT migration_version IF NOT EXISTS \
     FOR (m:Migration) REQUIRE m.version IS UNIQUE",
    "CREATE CONSTRAINT migration_version_pair IF NOT EXISTS \
     FOR (m:Migration) REQUIRE (m.versionDate, m.versionIncrement) IS UNIQUE",
];

pub struct MigrationRunner {
    executor: Arc<dyn QueryExecutor>,
}

impl MigrationRunner {
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self { executor }
    }

    async fn ensure_constraints(&self) -> CoreResult<()> {
        for constraint in CONSTRAINTS {
            self.executor.write_one(QueryObject::new(constraint)).await?;
        }
        Ok(())
    }

    /// Versions already recorded in the graph
    pub async fn applied(&self) -> CoreResult<HashSet<String>> {
        let query = QueryObject::new("MATCH (m:Migration) RETURN m.version AS version")
            .returning(["version"]);
        Ok(self
            .executor
            .read_many(query)
            .await?
            .iter()
            .filter_map(|r| r.get_str("version").map(str::to_string))
            .collect())
    }

    /// Apply every pending migration in order, stopping at the first
    /// failure. Returns the ids that were applied.
    pub async fn run(&self, mut migrations: Vec<Migration>) -> CoreResult<Vec<MigrationId>> {
        self.ensure_constraints().await?;
        let applied = self.applied().await?;

        migrations.sort_by(|a, b| a.id.cmp(&b.id));
        let pending: Vec<_> = migrations
            .into_iter()
            .filter(|m| !applied.contains(&m.id.to_string()))
            .collect();
        if pending.is_empty() {
            tracing::info!("Migrations up to date ({} applied)", applied.len());
            return Ok(Vec::new());
        }
        let plans = pending
            .iter()
            .map(Migration::partition)
            .collect::<CoreResult<Vec<_>>>()?;

        let mut done = Vec::with_capacity(pending.len());
        for (migration, (schema, data)) in pending.iter().zip(plans) {
            let version = migration.id.to_string();
            tracing::info!("Applying migration {} ({})", version, migration.name);

            for statement in schema {
                if let Err(e) = self.executor.write_one(QueryObject::new(statement)).await {
                    tracing::error!("Migration {} schema step failed: {}", version, e);
                    return Err(CoreError::Migration {
                        version,
                        source: Box::new(e),
                    });
                }
            }

            let mut statements: Vec<_> = data.into_iter().map(QueryObject::new).collect();
            statements.push(
                QueryObject::new(
                    "CREATE (:Migration {version: $version, versionDate: $versionDate, \
                     versionIncrement: $versionIncrement, appliedAt: $appliedAt})",
                )
                .param("version", version.clone())
                .param("versionDate", migration.id.date.clone())
                .param("versionIncrement", migration.id.increment)
                .param("appliedAt", chrono::Utc::now().to_rfc3339()),
            );

            if let Err(e) = self.executor.execute_in_transaction(statements).await {
                tracing::error!("Migration {} failed: {}", version, e);
                return Err(CoreError::Migration {
                    version,
                    source: Box::new(e),
                });
            }
            done.push(migration.id.clone());
        }

        tracing::info!("Applied {} migrations", done.len());
        Ok(done)
    }

    /// Discover migrations under `dir` and apply the pending ones
    pub async fn run_dir(&self, dir: &Path) -> CoreResult<Vec<MigrationId>> {
        let migrations = discover(dir)?;
        self.run(migrations).await
    }
}
