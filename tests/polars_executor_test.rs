use kgq_engine::error::ResolverError;
use kgq_engine::{PolarsSqlExecutor, WarehouseExecutor};
use polars::prelude::*;
use std::io::Write;

fn siteinfra() -> DataFrame {
    df![
        "siteid" => ["S1", "S2", "S3"],
        "province" => ["North", "South", "North"]
    ]
    .unwrap()
}

#[tokio::test]
async fn test_executes_against_registered_frame() {
    let executor = PolarsSqlExecutor::new(30).register("siteinfra", siteinfra());
    assert_eq!(executor.name(), "polars");

    let result = executor
        .execute("SELECT siteid FROM siteinfra WHERE province = 'North'")
        .await
        .unwrap();
    let ids: Vec<&str> = result
        .column("siteid")
        .unwrap()
        .str()
        .unwrap()
        .into_no_null_iter()
        .collect();
    assert_eq!(ids, vec!["S1", "S3"]);
}

#[tokio::test]
async fn test_unknown_table_is_an_execution_error() {
    let executor = PolarsSqlExecutor::new(30).register("siteinfra", siteinfra());
    let err = executor.execute("SELECT * FROM fuel").await.unwrap_err();
    assert!(matches!(err, ResolverError::Execution(_)));
}

#[tokio::test]
async fn test_registers_csv_directory() {
    let dir = tempfile::tempdir().unwrap();
    let mut file = std::fs::File::create(dir.path().join("fuel.csv")).unwrap();
    writeln!(file, "siteid,fuel_consumed").unwrap();
    writeln!(file, "S1,10.5").unwrap();
    writeln!(file, "S2,4.0").unwrap();
    std::fs::write(dir.path().join("notes.txt"), "not a table").unwrap();

    let executor = PolarsSqlExecutor::new(30).register_csv_dir(dir.path()).unwrap();
    assert_eq!(executor.table_names(), vec!["fuel"]);

    let result = executor
        .execute("SELECT siteid FROM fuel WHERE fuel_consumed > 5")
        .await
        .unwrap();
    assert_eq!(result.height(), 1);
}
