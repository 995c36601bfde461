use retail_etl::{CsvSource, LoadStatus, PipelineBuilder, RunState, Warehouse};
use std::path::Path;
use tempfile::TempDir;

const HEADER: &str = "Row ID,Order ID,Order Date,Ship Date,Ship Mode,Customer ID,Customer Name,Segment,\
Country,City,State,Postal Code,Region,Product ID,Category,Sub-Category,Product Name,Sales";

fn write_batch(dir: &TempDir, rows: &[&str]) -> std::path::PathBuf {
    let path = dir.path().join("retail_sales.csv");
    let mut body = String::from(HEADER);
    for row in rows {
        body.push('\n');
        body.push_str(row);
    }
    body.push('\n');
    std::fs::write(&path, body).unwrap();
    path
}

async fn pipeline_for(path: &Path, warehouse: Warehouse) -> retail_etl::Pipeline {
    PipelineBuilder::new()
        .with_source(Box::new(CsvSource::new(path)))
        .with_warehouse(warehouse)
        .with_archive(None)
        .build()
        .await
        .unwrap()
}

const BATCH: [&str; 3] = [
    "1,CA-1,2024-01-05,2024-01-08,Second Class,C-1,Claire Gute,Consumer,United States,Henderson,Kentucky,42420,South,P-1,Furniture,Chairs,Chair,100",
    "2,CA-1,2024-01-05,2024-01-08,Second Class,C-1,Claire Gute,Consumer,United States,Henderson,Kentucky,42420,South,P-2,Office Supplies,Labels,Labels,20",
    "3,CA-2,2024-01-06,2024-01-09,Standard Class,C-2,Darrin Van Huff,Corporate,United States,Los Angeles,California,90036,West,P-1,Furniture,Chairs,Chair,200",
];

#[tokio::test]
async fn test_rerun_of_same_batch_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_batch(&dir, &BATCH);
    let pipeline = pipeline_for(&path, Warehouse::in_memory().await.unwrap()).await;

    let first = pipeline.run_once().await;
    assert!(first.success, "{:?}", first.message);
    assert_eq!(first.inserted("fact_sales"), 3);
    let before = pipeline.warehouse().stats().await.unwrap();
    assert_eq!(before.customers, 2);
    assert_eq!(before.products, 2);
    assert_eq!(before.dates, 4);

    let second = pipeline.run_once().await;
    assert!(second.success);
    assert_eq!(second.inserted("fact_sales"), 0);
    assert_eq!(second.table("fact_sales").unwrap().existing, 3);
    assert_eq!(pipeline.warehouse().stats().await.unwrap(), before);
}

#[tokio::test]
async fn test_new_row_id_is_added_and_seen_rows_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_batch(&dir, &BATCH[..2]);
    let pipeline = pipeline_for(&path, Warehouse::in_memory().await.unwrap()).await;
    assert!(pipeline.run_once().await.success);

    write_batch(
        &dir,
        &[
            BATCH[0],
            "42,CA-9,2024-02-01,2024-02-03,First Class,C-1,Claire Gute,Consumer,United States,Henderson,Kentucky,42420,South,P-1,Furniture,Chairs,Chair,55",
        ],
    );
    let report = pipeline.run_once().await;

    assert!(report.success);
    assert_eq!(report.inserted("fact_sales"), 1);
    assert_eq!(report.inserted("dim_customer"), 0);
    let order: String = sqlx::query_scalar("SELECT order_id FROM fact_sales WHERE row_id = 42")
        .fetch_one(pipeline.warehouse().pool())
        .await
        .unwrap();
    assert_eq!(order, "CA-9");
}

#[tokio::test]
async fn test_date_keys_stay_consistent_across_batches() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_batch(&dir, &BATCH);
    let pipeline = pipeline_for(&path, Warehouse::in_memory().await.unwrap()).await;
    assert!(pipeline.run_once().await.success);

    // 新批次的最早日期与已存日期的代理键冲突
    write_batch(
        &dir,
        &["7,CA-7,2024-01-02,2024-01-06,Same Day,C-3,Erin Smith,Consumer,United States,Dallas,Texas,75081,Central,P-3,Technology,Phones,Phone,300"],
    );
    let report = pipeline.run_once().await;
    assert!(report.success);
    assert_eq!(report.table("dim_date").unwrap().rekeyed, 1);

    let rows: Vec<(i64, String, String)> = sqlx::query_as(
        r#"
        SELECT f.row_id, o.date, s.date
        FROM fact_sales f
        JOIN dim_date o ON o.date_id = f.order_date_id
        JOIN dim_date s ON s.date_id = f.ship_date_id
        ORDER BY f.row_id
        "#,
    )
    .fetch_all(pipeline.warehouse().pool())
    .await
    .unwrap();

    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0], (1, "2024-01-05".to_string(), "2024-01-08".to_string()));
    assert_eq!(rows[2], (3, "2024-01-06".to_string(), "2024-01-09".to_string()));
    assert_eq!(rows[3], (7, "2024-01-02".to_string(), "2024-01-06".to_string()));

    let distinct: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT date) FROM dim_date")
        .fetch_one(pipeline.warehouse().pool())
        .await
        .unwrap();
    assert_eq!(distinct, pipeline.warehouse().stats().await.unwrap().dates as i64);
}

#[tokio::test]
async fn test_fact_keys_resolve_in_dimensions() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_batch(&dir, &BATCH);
    let pipeline = pipeline_for(&path, Warehouse::in_memory().await.unwrap()).await;
    assert!(pipeline.run_once().await.success);

    let dangling: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM fact_sales f
        LEFT JOIN dim_customer c ON c.customer_id = f.customer_id
        LEFT JOIN dim_product p ON p.product_id = f.product_id
        LEFT JOIN dim_date d ON d.date_id = f.order_date_id
        WHERE c.customer_id IS NULL OR p.product_id IS NULL OR d.date_id IS NULL
        "#,
    )
    .fetch_one(pipeline.warehouse().pool())
    .await
    .unwrap();
    assert_eq!(dangling, 0);
}

#[tokio::test]
async fn test_failed_dimension_table_does_not_block_others() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_batch(&dir, &BATCH);
    let warehouse = Warehouse::in_memory().await.unwrap();
    sqlx::query("CREATE TABLE dim_product (product_id TEXT PRIMARY KEY, label TEXT)")
        .execute(warehouse.pool())
        .await
        .unwrap();
    let pipeline = pipeline_for(&path, warehouse).await;

    let report = pipeline.run_once().await;

    assert!(report.success);
    assert_eq!(report.state, RunState::Success);
    assert!(!report.table("dim_product").unwrap().is_committed());
    assert!(report.message.as_deref().unwrap().contains("dim_product"));
    let stats = pipeline.warehouse().stats().await.unwrap();
    assert_eq!(stats.products, 0);
    assert_eq!(stats.customers, 2);
    assert_eq!(stats.facts, 3);
}

#[tokio::test]
async fn test_missing_source_fails_without_writes() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_for(&dir.path().join("absent.csv"), Warehouse::in_memory().await.unwrap()).await;

    let report = pipeline.run_once().await;

    assert!(!report.success);
    assert_eq!(report.state, RunState::Failed);
    assert_eq!(report.last_stage, RunState::Pending);
    let stats = pipeline.warehouse().stats().await.unwrap();
    assert_eq!(stats.facts + stats.customers + stats.products + stats.dates, 0);
    assert!(pipeline.warehouse().run_lock_holder().await.unwrap().is_none());
}

#[tokio::test]
async fn test_concurrent_run_is_rejected_while_lock_held() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_batch(&dir, &BATCH);
    let warehouse = Warehouse::in_memory().await.unwrap();
    warehouse.ensure_schema().await.unwrap();
    let lease = warehouse
        .acquire_run_lock("other-run", chrono::Duration::hours(1))
        .await
        .unwrap()
        .unwrap();
    let pipeline = pipeline_for(&path, warehouse.clone()).await;

    let report = pipeline.run_once().await;
    assert!(!report.success);
    assert!(report.message.as_deref().unwrap().contains("other-run"));
    assert_eq!(warehouse.stats().await.unwrap().facts, 0);

    warehouse.release_run_lock(&lease).await.unwrap();
    assert!(pipeline.run_once().await.success);
}

#[tokio::test]
async fn test_archive_snapshots_written() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_batch(&dir, &BATCH);
    let archive = dir.path().join("archive");
    let pipeline = PipelineBuilder::new()
        .with_source(Box::new(CsvSource::new(&path)))
        .with_warehouse(Warehouse::in_memory().await.unwrap())
        .with_archive(Some(archive.clone()))
        .build()
        .await
        .unwrap();

    assert!(pipeline.run_once().await.success);

    assert_eq!(std::fs::read_dir(archive.join("raw")).unwrap().count(), 1);
    let processed: Vec<String> = std::fs::read_dir(archive.join("processed"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(processed.len(), 5);
    assert!(processed.iter().any(|f| f.starts_with("fact_sales_")));
}

#[tokio::test]
async fn test_fact_failure_midway_rolls_back_whole_fact_batch() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_batch(&dir, &BATCH);
    let warehouse = Warehouse::in_memory().await.unwrap();
    warehouse.ensure_schema().await.unwrap();
    sqlx::query(
        "CREATE TRIGGER reject_second_fact BEFORE INSERT ON fact_sales \
         WHEN NEW.row_id = 2 BEGIN SELECT RAISE(ABORT, 'rejected'); END",
    )
    .execute(warehouse.pool())
    .await
    .unwrap();
    let pipeline = pipeline_for(&path, warehouse).await;

    let report = pipeline.run_once().await;

    assert!(report.success);
    assert_eq!(report.state, RunState::Success);
    assert!(matches!(
        report.table("fact_sales").unwrap().status,
        LoadStatus::RolledBack { .. }
    ));
    assert_eq!(report.inserted("fact_sales"), 0);
    assert!(report.message.as_deref().unwrap().contains("fact_sales"));
    let stats = pipeline.warehouse().stats().await.unwrap();
    assert_eq!(stats.facts, 0);
    assert_eq!(stats.customers, 2);
    assert_eq!(stats.products, 2);
}

#[tokio::test]
async fn test_entirely_blank_profit_column_loads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("retail_sales.csv");
    std::fs::write(
        &path,
        "Row ID,Order ID,Customer ID,Product ID,Sales,Profit\n1,CA-1,C-1,P-1,100,\n",
    )
    .unwrap();
    let pipeline = pipeline_for(&path, Warehouse::in_memory().await.unwrap()).await;

    let report = pipeline.run_once().await;

    assert!(report.success, "{:?}", report.message);
    assert_eq!(report.inserted("fact_sales"), 1);
    let (profit, quantity): (f64, i64) =
        sqlx::query_as("SELECT profit, quantity FROM fact_sales WHERE row_id = 1")
            .fetch_one(pipeline.warehouse().pool())
            .await
            .unwrap();
    assert_eq!(profit, 20.0);
    assert_eq!(quantity, 1);
}

#[tokio::test]
async fn test_na_sales_marker_drops_row() {
    let dir = tempfile::tempdir().unwrap();
    let missing_sales = BATCH[1].replace(",Labels,Labels,20", ",Labels,Labels,NA");
    let path = write_batch(&dir, &[BATCH[0], missing_sales.as_str(), BATCH[2]]);
    let pipeline = pipeline_for(&path, Warehouse::in_memory().await.unwrap()).await;

    let report = pipeline.run_once().await;

    assert!(report.success, "{:?}", report.message);
    assert_eq!(report.rows_extracted, 3);
    assert_eq!(report.rows_cleaned, 2);
    let row_ids: Vec<i64> = sqlx::query_scalar("SELECT row_id FROM fact_sales ORDER BY row_id")
        .fetch_all(pipeline.warehouse().pool())
        .await
        .unwrap();
    assert_eq!(row_ids, vec![1, 3]);
}
