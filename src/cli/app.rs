use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;

use column_migrator::core::DataType;
use column_migrator::{
    ColumnSpec, ConsoleSink, MigrationError, MigrationPlan, MigrationRunner, MigratorConfig,
    NullSink, PgDatabase, SchemaError, Step, TableRef, Value,
};

#[derive(Parser, Debug)]
#[command(name = "column-migrator", version)]
#[command(about = "Idempotent add-column migrations with catalog verification")]
pub struct Cli {
    /// Schema for table names given without one (overrides MIGRATOR_SCHEMA)
    #[arg(long, global = true)]
    pub schema: Option<String>,

    /// Per round-trip timeout in milliseconds (overrides MIGRATOR_STATEMENT_TIMEOUT_MS)
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Print the result as JSON on stdout
    #[arg(long, global = true)]
    pub json: bool,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the columns of a table
    Describe { table: String },
    /// Report whether a column exists
    Inspect { table: String, column: String },
    /// Show column metadata, matching CHECK constraints and value distribution
    Verify { table: String, column: String },
    /// Add a column unless present, then verify it
    Migrate(MigrateArgs),
}

#[derive(Args, Debug)]
pub struct MigrateArgs {
    pub table: String,
    pub column: String,

    /// Column type, e.g. text, integer, boolean
    #[arg(long = "type", value_name = "TYPE")]
    pub data_type: String,

    /// Column default
    #[arg(long)]
    pub default: Option<String>,

    /// Comma-separated allowed values, enforced by a CHECK constraint
    #[arg(long, value_delimiter = ',')]
    pub allowed: Vec<String>,

    /// Value for existing NULL or empty rows; defaults to --default
    #[arg(long)]
    pub default_for_nulls: Option<String>,

    #[arg(long)]
    pub not_null: bool,

    /// Print the statements without connecting
    #[arg(long)]
    pub dry_run: bool,
}

impl MigrateArgs {
    /// Column specification and backfill value, typed by `--type`.
    pub fn column_spec(&self) -> Result<(ColumnSpec, Value)> {
        let data_type = DataType::parse(&self.data_type);
        let mut spec = ColumnSpec::new(&self.column, data_type.clone());

        if let Some(raw) = &self.default {
            spec = spec.default_value(Value::parse_as(raw, &data_type)?);
        }
        if self.not_null {
            spec = spec.not_null();
        }
        let allowed = self
            .allowed
            .iter()
            .map(|raw| Value::parse_as(raw.trim(), &data_type))
            .collect::<column_migrator::Result<Vec<_>>>()?;
        spec = spec.allowed(allowed);

        let default_for_nulls = match (&self.default_for_nulls, &self.default) {
            (Some(raw), _) | (None, Some(raw)) => Value::parse_as(raw, &data_type)?,
            (None, None) => {
                return Err(SchemaError::InvalidSpec(
                    "--default-for-nulls is required when --default is not given".to_string(),
                )
                .into());
            }
        };

        Ok((spec, default_for_nulls))
    }
}

pub struct App {
    cli: Cli,
}

impl App {
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    pub async fn run(self) -> ExitCode {
        match self.execute().await {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                self.report_error(&err);
                exit_code(&err)
            }
        }
    }

    async fn execute(&self) -> Result<()> {
        let config = self.config()?;
        let runner = if self.cli.json {
            MigrationRunner::from_config(&config).with_sink(NullSink)
        } else {
            MigrationRunner::from_config(&config).with_sink(ConsoleSink)
        };

        if let Command::Migrate(args) = &self.cli.command
            && args.dry_run
        {
            return self.dry_run(&config, args);
        }

        let mut db = PgDatabase::connect(&config).await?;

        match &self.cli.command {
            Command::Describe { table } => {
                let table = TableRef::parse(table, &config.schema)?;
                let descriptor = runner.describe(&db, &table).await?;
                self.emit(&descriptor)
            }
            Command::Inspect { table, column } => {
                let table = TableRef::parse(table, &config.schema)?;
                let presence = runner.inspect(&db, &table, column).await?;
                self.emit(&json!({ "table": table, "column": column, "presence": presence }))
            }
            Command::Verify { table, column } => {
                let table = TableRef::parse(table, &config.schema)?;
                let snapshot = runner.verify(&db, &table, column).await?;
                self.emit(&json!({ "snapshot": snapshot, "findings": snapshot.findings() }))
            }
            Command::Migrate(args) => {
                let table = TableRef::parse(&args.table, &config.schema)?;
                let (spec, default_for_nulls) = args.column_spec()?;
                let outcome = runner.run(&mut db, &table, &spec, &default_for_nulls).await?;
                self.emit(&outcome)
            }
        }
    }

    fn config(&self) -> Result<MigratorConfig> {
        let mut config = MigratorConfig::from_env()?;
        if let Some(schema) = &self.cli.schema {
            config = config.schema(schema);
        }
        if let Some(millis) = self.cli.timeout_ms {
            config = config.statement_timeout(Duration::from_millis(millis));
        }
        config.validate()?;
        Ok(config)
    }

    fn dry_run(&self, config: &MigratorConfig, args: &MigrateArgs) -> Result<()> {
        let table = TableRef::parse(&args.table, &config.schema)?;
        let (spec, default_for_nulls) = args.column_spec()?;
        let plan = MigrationPlan::new(table, spec, default_for_nulls)
            .context("migration plan is invalid")?;
        let statements = plan.statements();

        if self.cli.json {
            return self.emit(&json!({ "plan": plan, "statements": statements }));
        }
        for statement in statements {
            println!("{};", statement);
        }
        Ok(())
    }

    fn emit<T: Serialize>(&self, value: &T) -> Result<()> {
        if self.cli.json {
            let document = serde_json::to_string_pretty(value).context("cannot encode result")?;
            println!("{}", document);
        }
        Ok(())
    }

    fn report_error(&self, err: &anyhow::Error) {
        let migration = err.downcast_ref::<MigrationError>();

        if self.cli.json {
            let document = match migration {
                Some(failure) => json!({
                    "error": {
                        "kind": failure.kind(),
                        "step": failure.step,
                        "table": failure.table,
                        "column": failure.column,
                        "pre_state": failure.pre_state,
                        "rollback": failure.rollback,
                        "message": failure.source.to_string(),
                    }
                }),
                None => json!({ "error": { "message": format!("{:#}", err) } }),
            };
            println!("{}", document);
            return;
        }

        match migration {
            // The display of a migration error already names its source.
            Some(failure) => eprintln!("error: {}", failure),
            None => eprintln!("error: {:#}", err),
        }
        if migration.is_some_and(MigrationError::is_unrecoverable) {
            eprintln!("the table may be inconsistent; inspect it before running again");
        }
    }
}

pub fn exit_code(err: &anyhow::Error) -> ExitCode {
    ExitCode::from(exit_status(err))
}

/// 2 for configuration and usage errors, 1 for every other failure.
pub fn exit_status(err: &anyhow::Error) -> u8 {
    let usage = match err.downcast_ref::<MigrationError>() {
        Some(failure) => {
            failure.step == Step::Validate && matches!(failure.source, SchemaError::InvalidSpec(_))
        }
        None => matches!(
            err.downcast_ref::<SchemaError>(),
            Some(SchemaError::Config(_) | SchemaError::InvalidSpec(_))
        ),
    };

    if usage { 2 } else { 1 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("column-migrator").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_migrate_args() {
        let cli = parse(&[
            "migrate",
            "properties",
            "status",
            "--type",
            "text",
            "--default",
            "거래중",
            "--allowed",
            "거래중,거래완료",
            "--json",
        ]);
        assert!(cli.json);

        let Command::Migrate(args) = cli.command else {
            panic!("expected migrate");
        };
        let (spec, default_for_nulls) = args.column_spec().unwrap();
        assert_eq!(spec.allowed, vec![Value::from("거래중"), Value::from("거래완료")]);
        assert_eq!(spec.default, Some(Value::from("거래중")));
        assert!(spec.nullable);
        assert_eq!(default_for_nulls, Value::from("거래중"));
    }

    #[test]
    fn test_backfill_value_required_without_default() {
        let cli = parse(&["migrate", "properties", "floor", "--type", "int"]);
        let Command::Migrate(args) = cli.command else {
            panic!("expected migrate");
        };
        let err = args.column_spec().unwrap_err();
        assert_eq!(exit_status(&err), 2);
    }

    #[test]
    fn test_typed_values() {
        let cli = parse(&[
            "migrate", "properties", "floor", "--type", "integer", "--default-for-nulls", "1",
        ]);
        let Command::Migrate(args) = cli.command else {
            panic!("expected migrate");
        };
        let (spec, default_for_nulls) = args.column_spec().unwrap();
        assert_eq!(spec.data_type, DataType::Integer);
        assert_eq!(default_for_nulls, Value::Integer(1));
    }

    #[test]
    fn test_exit_codes() {
        let config = anyhow::Error::from(SchemaError::Config("DATABASE_URL is not set".into()));
        assert_eq!(exit_status(&config), 2);

        let table = TableRef::new("public", "properties");
        let rejected = anyhow::Error::from(MigrationError::new(
            Step::Validate,
            &table,
            Some("status"),
            SchemaError::ConstraintViolation("'보류' is not allowed".into()),
        ));
        assert_eq!(exit_status(&rejected), 1);

        let conflict = anyhow::Error::from(MigrationError::new(
            Step::AddColumn,
            &table,
            Some("status"),
            SchemaError::SchemaConflict("column \"status\" already exists".into()),
        ));
        assert_eq!(exit_status(&conflict), 1);
    }
}
