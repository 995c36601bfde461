//! 基础 ETL 示例
//!
//! 展示如何把一个零售销售 CSV 加载为星型模型

use retail_etl::{CsvSource, PipelineBuilder, Warehouse};

const SAMPLE: &str = "\
Row ID,Order ID,Order Date,Ship Date,Ship Mode,Customer ID,Customer Name,Segment,City,Region,Product ID,Category,Product Name,Sales,Quantity
1,CA-2024-1,05/01/2024,08/01/2024,Second Class,CG-12520,Claire Gute,Consumer,Henderson,South,FUR-BO-1,Furniture,Bookcase,261.96,2
2,CA-2024-1,05/01/2024,08/01/2024,Second Class,CG-12520,Claire Gute,Consumer,Henderson,South,FUR-CH-1,Furniture,Chair,731.94,3
3,CA-2024-2,06/01/2024,10/01/2024,Standard Class,DV-13045,Darrin Van Huff,Corporate,Los Angeles,West,OFF-LA-1,Office Supplies,Labels,14.62,
";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("=== ETL 基础示例 ===\n");

    // 1. 准备数据源
    let dir = std::env::temp_dir().join("retail-etl-demo");
    std::fs::create_dir_all(&dir)?;
    let source = dir.join("retail_sales.csv");
    std::fs::write(&source, SAMPLE)?;
    println!("1. 数据源: {}", source.display());

    // 2. 创建 ETL 管道
    let pipeline = PipelineBuilder::new()
        .with_source(Box::new(CsvSource::new(&source)))
        .with_warehouse(Warehouse::in_memory().await?)
        .with_archive(Some(dir.join("archive")))
        .build()
        .await?;

    // 3. 运行两次，第二次不应写入任何新行
    for attempt in 1..=2 {
        let report = pipeline.run_once().await;
        println!("\n2.{} 运行 {}: {}", attempt, report.run_id, report.state);
        for table in &report.tables {
            println!(
                "   {:<14} 新增 {:>3}  已存在 {:>3}  {:?}",
                table.table, table.inserted, table.existing, table.status
            );
        }
    }

    // 4. 统计
    let stats = pipeline.warehouse().stats().await?;
    println!(
        "\n3. 仓库: {} 客户, {} 产品, {} 日期, {} 事实",
        stats.customers, stats.products, stats.dates, stats.facts
    );

    pipeline.close().await;
    Ok(())
}
