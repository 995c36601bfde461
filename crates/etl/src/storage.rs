//! 数据仓库持久化模块
//!
//! 维度表按自然键 insert-or-ignore（首次写入优先），事实表按 row_id 查重后插入。
//! 每张表各自一个事务：某张表失败只回滚该表，并写入报告，不向上传播。

use crate::dimension::{
    DateDimension, DateKeyResolver, DimCustomer, DimDate, DimProduct, FactSale, StarSchema,
    DIM_CUSTOMER, DIM_DATE, DIM_PRODUCT, FACT_SALES,
};
use crate::types::{EtlResult, LoadStatus, TableLoad};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

const SCHEMA: [&str; 6] = [
    r#"
    CREATE TABLE IF NOT EXISTS dim_customer (
        customer_id TEXT PRIMARY KEY,
        customer_name TEXT,
        segment TEXT,
        country TEXT,
        city TEXT,
        state TEXT,
        postal_code TEXT,
        region TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS dim_product (
        product_id TEXT PRIMARY KEY,
        category TEXT,
        sub_category TEXT,
        product_name TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS dim_date (
        date_id INTEGER PRIMARY KEY,
        date TEXT NOT NULL UNIQUE,
        day INTEGER,
        month INTEGER,
        year INTEGER,
        quarter INTEGER,
        day_of_week INTEGER,
        is_weekend INTEGER
    )
    "#,
    // 外键列可为空且不由库强制约束：某张维度表加载失败时事实表仍可加载
    r#"
    CREATE TABLE IF NOT EXISTS fact_sales (
        row_id INTEGER PRIMARY KEY,
        order_id TEXT NOT NULL,
        customer_id TEXT,
        product_id TEXT,
        order_date_id INTEGER,
        ship_date_id INTEGER,
        ship_mode TEXT,
        sales REAL,
        quantity INTEGER,
        discount REAL,
        profit REAL,
        profit_margin REAL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_fact_sales_order_id ON fact_sales(order_id)",
    r#"
    CREATE TABLE IF NOT EXISTS etl_run_lock (
        lock_id INTEGER PRIMARY KEY CHECK (lock_id = 1),
        holder TEXT NOT NULL,
        acquired_at TEXT NOT NULL
    )
    "#,
];

/// 可按自然键 insert-or-ignore 的维度行
#[async_trait]
pub trait DimensionRow: Send + Sync {
    const TABLE: &'static str;

    /// 插入一行；自然键冲突时忽略。返回受影响行数
    async fn insert_or_ignore(&self, conn: &mut SqliteConnection) -> sqlx::Result<u64>;
}

#[async_trait]
impl DimensionRow for DimCustomer {
    const TABLE: &'static str = DIM_CUSTOMER;

    async fn insert_or_ignore(&self, conn: &mut SqliteConnection) -> sqlx::Result<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO dim_customer
            (customer_id, customer_name, segment, country, city, state, postal_code, region)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (customer_id) DO NOTHING
            "#,
        )
        .bind(&self.customer_id)
        .bind(&self.customer_name)
        .bind(&self.segment)
        .bind(&self.country)
        .bind(&self.city)
        .bind(&self.state)
        .bind(&self.postal_code)
        .bind(&self.region)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl DimensionRow for DimProduct {
    const TABLE: &'static str = DIM_PRODUCT;

    async fn insert_or_ignore(&self, conn: &mut SqliteConnection) -> sqlx::Result<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO dim_product (product_id, category, sub_category, product_name)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (product_id) DO NOTHING
            "#,
        )
        .bind(&self.product_id)
        .bind(&self.category)
        .bind(&self.sub_category)
        .bind(&self.product_name)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }
}

/// 日期行按给定代理键插入；date 或 date_id 任一冲突都忽略
async fn insert_date(conn: &mut SqliteConnection, row: &DimDate, date_id: i64) -> sqlx::Result<u64> {
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO dim_date
        (date_id, date, day, month, year, quarter, day_of_week, is_weekend)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(date_id)
    .bind(row.date.to_string())
    .bind(row.day as i64)
    .bind(row.month as i64)
    .bind(row.year as i64)
    .bind(row.quarter as i64)
    .bind(row.day_of_week as i64)
    .bind(row.is_weekend as i64)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

async fn stored_date_id(conn: &mut SqliteConnection, date: NaiveDate) -> sqlx::Result<Option<i64>> {
    sqlx::query_scalar("SELECT date_id FROM dim_date WHERE date = ?")
        .bind(date.to_string())
        .fetch_optional(conn)
        .await
}

/// 持有运行锁的租约
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLease {
    pub holder: String,
}

/// 一次完整加载的结果
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub tables: Vec<TableLoad>,
}

impl LoadReport {
    pub fn table(&self, name: &str) -> Option<&TableLoad> {
        self.tables.iter().find(|t| t.table == name)
    }
}

/// 数据仓库
#[derive(Debug, Clone)]
pub struct Warehouse {
    pool: SqlitePool,
}

impl Warehouse {
    /// 连接数据库
    pub async fn connect(database_url: &str, max_connections: u32) -> EtlResult<Self> {
        // 确保数据库文件的目录存在
        let file = database_url
            .trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:");
        if !file.starts_with(':') && !file.contains("mode=memory") {
            if let Some(parent) = Path::new(file).parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(false);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// 内存数据库：单连接且不过期，保证所有操作看到同一个库
    pub async fn in_memory() -> EtlResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(false);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// 建表（已存在时不做任何事）
    pub async fn ensure_schema(&self) -> EtlResult<()> {
        tracing::info!("Creating database tables if they don't exist");
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// 获取运行锁；锁已被他人持有且未过期时返回 None
    pub async fn acquire_run_lock(&self, holder: &str, ttl: Duration) -> EtlResult<Option<RunLease>> {
        let now = Utc::now();
        let stale_before = (now - ttl).to_rfc3339_opts(SecondsFormat::Millis, true);

        let mut tx = self.pool.begin().await?;
        let expired = sqlx::query("DELETE FROM etl_run_lock WHERE acquired_at < ?")
            .bind(&stale_before)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if expired > 0 {
            tracing::warn!("Replaced a stale run lock older than {}", stale_before);
        }

        let acquired = sqlx::query(
            "INSERT OR IGNORE INTO etl_run_lock (lock_id, holder, acquired_at) VALUES (1, ?, ?)",
        )
        .bind(holder)
        .bind(now.to_rfc3339_opts(SecondsFormat::Millis, true))
        .execute(&mut *tx)
        .await?
        .rows_affected();
        tx.commit().await?;

        if acquired == 1 {
            Ok(Some(RunLease {
                holder: holder.to_string(),
            }))
        } else {
            Ok(None)
        }
    }

    /// 当前持锁者
    pub async fn run_lock_holder(&self) -> EtlResult<Option<String>> {
        Ok(sqlx::query_scalar("SELECT holder FROM etl_run_lock WHERE lock_id = 1")
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn release_run_lock(&self, lease: &RunLease) -> EtlResult<()> {
        sqlx::query("DELETE FROM etl_run_lock WHERE holder = ?")
            .bind(&lease.holder)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// 加载整套星型模型：先维度（客户、产品、日期），后事实
    pub async fn load(&self, star: &StarSchema) -> LoadReport {
        tracing::info!("Starting data loading workflow");
        let mut tables = Vec::with_capacity(4);

        tables.push(match &star.customers {
            Some(rows) => self.upsert_dimension(rows).await,
            None => TableLoad::not_built(DIM_CUSTOMER),
        });
        tables.push(match &star.products {
            Some(rows) => self.upsert_dimension(rows).await,
            None => TableLoad::not_built(DIM_PRODUCT),
        });

        let stored_keys = match &star.dates {
            Some(dates) => {
                let (load, keys) = self.upsert_dates(dates).await;
                tables.push(load);
                Some(keys.unwrap_or_default())
            }
            None => {
                tables.push(TableLoad::not_built(DIM_DATE));
                None
            }
        };

        tables.push(match &star.facts {
            Some(facts) => {
                let mut facts = facts.clone();
                // 以库中实际的代理键为准；日期表加载失败时外键置空
                if let Some(keys) = &stored_keys {
                    keys.apply(&mut facts);
                }
                self.insert_facts(&facts).await
            }
            None => TableLoad::not_built(FACT_SALES),
        });

        tracing::info!("Data loading workflow completed");
        LoadReport { tables }
    }

    /// 维度 upsert：整表一个事务，失败只回滚本表
    pub async fn upsert_dimension<R: DimensionRow>(&self, rows: &[R]) -> TableLoad {
        if rows.is_empty() {
            tracing::warn!("No data to load for {}", R::TABLE);
            return committed(R::TABLE, 0, 0, 0);
        }
        tracing::info!("Loading {} rows into {}", rows.len(), R::TABLE);

        let result: sqlx::Result<u64> = async {
            let mut tx = self.pool.begin().await?;
            let mut inserted = 0;
            for row in rows {
                inserted += row.insert_or_ignore(&mut *tx).await?;
            }
            tx.commit().await?;
            Ok::<_, sqlx::Error>(inserted)
        }
        .await;

        match result {
            Ok(inserted) => {
                let existing = rows.len() as u64 - inserted;
                tracing::info!("Loaded {}: {} inserted, {} already present", R::TABLE, inserted, existing);
                committed(R::TABLE, inserted, existing, 0)
            }
            Err(e) => {
                tracing::error!("Error loading {}: {}", R::TABLE, e);
                TableLoad::rolled_back(R::TABLE, e.to_string())
            }
        }
    }

    /// 日期维度加载，并返回批次日期在库中的实际代理键
    ///
    /// 批次代理键若已被另一个日期占用，则以 MAX(date_id) + 1 重新分配。
    /// 加载失败时返回 None，调用方应把事实表的日期外键置空。
    pub async fn upsert_dates(&self, dates: &DateDimension) -> (TableLoad, Option<DateKeyResolver>) {
        if dates.is_empty() {
            tracing::warn!("No data to load for {}", DIM_DATE);
            return (committed(DIM_DATE, 0, 0, 0), Some(DateKeyResolver::default()));
        }
        tracing::info!("Loading {} rows into {}", dates.len(), DIM_DATE);

        let result: sqlx::Result<(u64, u64, Vec<(NaiveDate, i64)>)> = async {
            let mut tx = self.pool.begin().await?;
            let mut inserted = 0;
            let mut rekeyed = 0;
            let mut keys = Vec::with_capacity(dates.len());

            for row in dates.rows() {
                if insert_date(&mut *tx, row, row.date_id).await? == 1 {
                    inserted += 1;
                    keys.push((row.date, row.date_id));
                    continue;
                }
                if let Some(existing) = stored_date_id(&mut *tx, row.date).await? {
                    keys.push((row.date, existing));
                    continue;
                }

                let next: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(date_id), 0) + 1 FROM dim_date")
                    .fetch_one(&mut *tx)
                    .await?;
                insert_date(&mut *tx, row, next).await?;
                tracing::debug!("Date {} re-keyed from {} to {}", row.date, row.date_id, next);
                inserted += 1;
                rekeyed += 1;
                keys.push((row.date, next));
            }

            tx.commit().await?;
            Ok::<_, sqlx::Error>((inserted, rekeyed, keys))
        }
        .await;

        match result {
            Ok((inserted, rekeyed, keys)) => {
                let existing = dates.len() as u64 - inserted;
                tracing::info!(
                    "Loaded {}: {} inserted ({} re-keyed), {} already present",
                    DIM_DATE,
                    inserted,
                    rekeyed,
                    existing
                );
                (
                    committed(DIM_DATE, inserted, existing, rekeyed),
                    Some(DateKeyResolver::from_pairs(keys)),
                )
            }
            Err(e) => {
                tracing::error!("Error loading {}: {}", DIM_DATE, e);
                (TableLoad::rolled_back(DIM_DATE, e.to_string()), None)
            }
        }
    }

    /// 事实表：按 row_id 查重，已存在则跳过；整批一个事务
    pub async fn insert_facts(&self, facts: &[FactSale]) -> TableLoad {
        if facts.is_empty() {
            tracing::warn!("No data to load for {}", FACT_SALES);
            return committed(FACT_SALES, 0, 0, 0);
        }
        tracing::info!("Loading {} rows into {}", facts.len(), FACT_SALES);

        let result: sqlx::Result<u64> = async {
            let mut tx = self.pool.begin().await?;
            let mut inserted = 0;

            for fact in facts {
                let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM fact_sales WHERE row_id = ?")
                    .bind(fact.row_id)
                    .fetch_optional(&mut *tx)
                    .await?;
                if exists.is_some() {
                    continue;
                }

                sqlx::query(
                    r#"
                    INSERT INTO fact_sales
                    (row_id, order_id, customer_id, product_id, order_date_id, ship_date_id,
                     ship_mode, sales, quantity, discount, profit, profit_margin)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(fact.row_id)
                .bind(&fact.order_id)
                .bind(&fact.customer_id)
                .bind(&fact.product_id)
                .bind(fact.order_date_id)
                .bind(fact.ship_date_id)
                .bind(&fact.ship_mode)
                .bind(fact.sales)
                .bind(fact.quantity)
                .bind(fact.discount)
                .bind(fact.profit)
                .bind(fact.profit_margin)
                .execute(&mut *tx)
                .await?;
                inserted += 1;
            }

            tx.commit().await?;
            Ok::<_, sqlx::Error>(inserted)
        }
        .await;

        match result {
            Ok(inserted) => {
                let existing = facts.len() as u64 - inserted;
                tracing::info!("Loaded {}: {} inserted, {} skipped", FACT_SALES, inserted, existing);
                committed(FACT_SALES, inserted, existing, 0)
            }
            Err(e) => {
                tracing::error!("Error loading {}: {}", FACT_SALES, e);
                TableLoad::rolled_back(FACT_SALES, e.to_string())
            }
        }
    }

    /// 各表行数
    pub async fn stats(&self) -> EtlResult<WarehouseStats> {
        Ok(WarehouseStats {
            customers: self.count_rows(DIM_CUSTOMER).await?,
            products: self.count_rows(DIM_PRODUCT).await?,
            dates: self.count_rows(DIM_DATE).await?,
            facts: self.count_rows(FACT_SALES).await?,
        })
    }

    async fn count_rows(&self, table: &str) -> EtlResult<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count as usize)
    }
}

fn committed(table: &str, inserted: u64, existing: u64, rekeyed: u64) -> TableLoad {
    TableLoad {
        table: table.to_string(),
        inserted,
        existing,
        updated: 0,
        rekeyed,
        status: LoadStatus::Committed,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarehouseStats {
    pub customers: usize,
    pub products: usize,
    pub dates: usize,
    pub facts: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn customer(id: &str, city: &str) -> DimCustomer {
        DimCustomer {
            customer_id: id.to_string(),
            customer_name: format!("Customer {}", id),
            segment: Some("Consumer".to_string()),
            country: Some("United States".to_string()),
            city: Some(city.to_string()),
            state: None,
            postal_code: Some("42420".to_string()),
            region: Some("South".to_string()),
        }
    }

    fn fact(row_id: i64) -> FactSale {
        FactSale {
            row_id,
            order_id: format!("CA-{}", row_id),
            customer_id: Some("C-1".to_string()),
            product_id: Some("P-1".to_string()),
            order_date_id: None,
            ship_date_id: None,
            ship_mode: Some("Standard Class".to_string()),
            sales: Some(100.0),
            quantity: Some(1),
            discount: Some(0.0),
            profit: Some(20.0),
            profit_margin: Some(0.2),
            order_date: None,
            ship_date: None,
        }
    }

    async fn warehouse() -> Warehouse {
        let warehouse = Warehouse::in_memory().await.unwrap();
        warehouse.ensure_schema().await.unwrap();
        warehouse
    }

    #[tokio::test]
    async fn test_schema_creation_is_idempotent() {
        let warehouse = warehouse().await;
        warehouse.ensure_schema().await.unwrap();

        let stats = warehouse.stats().await.unwrap();
        assert_eq!(stats.facts, 0);
    }

    #[tokio::test]
    async fn test_dimension_upsert_keeps_first_write() {
        let warehouse = warehouse().await;

        let first = warehouse.upsert_dimension(&[customer("C-1", "Henderson")]).await;
        assert_eq!(first.inserted, 1);

        let second = warehouse
            .upsert_dimension(&[customer("C-1", "Louisville"), customer("C-2", "Austin")])
            .await;
        assert!(second.is_committed());
        assert_eq!(second.inserted, 1);
        assert_eq!(second.existing, 1);
        assert_eq!(second.updated, 0);

        let city: String = sqlx::query_scalar("SELECT city FROM dim_customer WHERE customer_id = 'C-1'")
            .fetch_one(warehouse.pool())
            .await
            .unwrap();
        assert_eq!(city, "Henderson");
    }

    #[tokio::test]
    async fn test_fact_insert_skips_seen_row_ids() {
        let warehouse = warehouse().await;

        let first = warehouse.insert_facts(&[fact(42), fact(43)]).await;
        assert_eq!(first.inserted, 2);

        let second = warehouse.insert_facts(&[fact(42), fact(44), fact(44)]).await;
        assert_eq!(second.inserted, 1);
        assert_eq!(second.existing, 2);
        assert_eq!(warehouse.stats().await.unwrap().facts, 3);
    }

    #[tokio::test]
    async fn test_dates_are_rekeyed_when_surrogate_taken() {
        let warehouse = warehouse().await;

        let run1 = DateDimension::from_dates(vec![date("2024-01-05"), date("2024-01-06")]);
        let (load, keys) = warehouse.upsert_dates(&run1).await;
        assert_eq!(load.inserted, 2);
        let keys = keys.unwrap();
        assert_eq!(keys.resolve(Some(date("2024-01-05"))), Some(1));

        // 新批次从 1 开始编号，与库中已有日期冲突
        let run2 = DateDimension::from_dates(vec![date("2024-01-06"), date("2024-02-01")]);
        let (load, keys) = warehouse.upsert_dates(&run2).await;
        let keys = keys.unwrap();
        assert_eq!(load.inserted, 1);
        assert_eq!(load.existing, 1);
        assert_eq!(load.rekeyed, 1);
        assert_eq!(keys.resolve(Some(date("2024-01-06"))), Some(2));
        assert_eq!(keys.resolve(Some(date("2024-02-01"))), Some(3));
    }

    #[tokio::test]
    async fn test_failed_table_rolls_back_alone() {
        let warehouse = Warehouse::in_memory().await.unwrap();
        sqlx::query("CREATE TABLE dim_product (product_id TEXT PRIMARY KEY, legacy_code TEXT NOT NULL)")
            .execute(warehouse.pool())
            .await
            .unwrap();
        warehouse.ensure_schema().await.unwrap();

        let star = StarSchema {
            customers: Some(vec![customer("C-1", "Henderson")]),
            products: Some(vec![DimProduct {
                product_id: "P-1".to_string(),
                category: None,
                sub_category: None,
                product_name: "Stapler".to_string(),
            }]),
            dates: None,
            facts: Some(vec![fact(1)]),
            facts_without_row_id: 0,
        };

        let report = warehouse.load(&star).await;
        assert!(report.table(DIM_CUSTOMER).unwrap().is_committed());
        assert!(matches!(
            report.table(DIM_PRODUCT).unwrap().status,
            LoadStatus::RolledBack { .. }
        ));
        assert_eq!(report.table(DIM_DATE).unwrap().status, LoadStatus::NotBuilt);
        assert_eq!(report.table(FACT_SALES).unwrap().inserted, 1);
    }

    #[tokio::test]
    async fn test_fact_batch_failing_midway_keeps_no_rows() {
        let warehouse = warehouse().await;
        sqlx::query(
            "CREATE TRIGGER reject_second_fact BEFORE INSERT ON fact_sales \
             WHEN NEW.row_id = 2 BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(warehouse.pool())
        .await
        .unwrap();

        let load = warehouse.insert_facts(&[fact(1), fact(2), fact(3)]).await;

        assert!(matches!(load.status, LoadStatus::RolledBack { .. }));
        assert_eq!(load.inserted, 0);
        assert_eq!(warehouse.stats().await.unwrap().facts, 0);

        sqlx::query("DROP TRIGGER reject_second_fact")
            .execute(warehouse.pool())
            .await
            .unwrap();
        let retry = warehouse.insert_facts(&[fact(1), fact(2), fact(3)]).await;
        assert_eq!(retry.inserted, 3);
        assert_eq!(retry.existing, 0);
    }

    #[tokio::test]
    async fn test_run_lock_is_exclusive() {
        let warehouse = warehouse().await;
        let ttl = Duration::minutes(10);

        let lease = warehouse.acquire_run_lock("run-a", ttl).await.unwrap().unwrap();
        assert!(warehouse.acquire_run_lock("run-b", ttl).await.unwrap().is_none());
        assert_eq!(warehouse.run_lock_holder().await.unwrap().as_deref(), Some("run-a"));

        warehouse.release_run_lock(&lease).await.unwrap();
        assert!(warehouse.acquire_run_lock("run-b", ttl).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_stale_run_lock_is_replaced() {
        let warehouse = warehouse().await;
        sqlx::query("INSERT INTO etl_run_lock (lock_id, holder, acquired_at) VALUES (1, 'crashed', '2000-01-01T00:00:00.000Z')")
            .execute(warehouse.pool())
            .await
            .unwrap();

        let lease = warehouse
            .acquire_run_lock("run-a", Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(lease.unwrap().holder, "run-a");
    }
}
